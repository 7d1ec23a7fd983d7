use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::Stores;

pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Sizes of the three stores at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Stats {
    pub chain_prefixes: usize,
    pub clips: usize,
    pub stickers: usize,
}

impl Stats {
    /// Each length is read under its store's own lock.
    pub async fn collect(stores: &Stores) -> Self {
        Self {
            chain_prefixes: stores.chain.len().await,
            clips: stores.clips.len().await,
            stickers: stores.stickers.len().await,
        }
    }
}

/// Logs [`Stats`] every `period` until the task is aborted.
pub fn spawn_stats_ticker(stores: Stores, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats = Stats::collect(&stores).await;
            info!(
                chain_prefixes = stats.chain_prefixes,
                clips = stats.clips,
                stickers = stats.stickers,
                "Nocino stats"
            );
        }
    })
}
