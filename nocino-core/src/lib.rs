//! nocino-core
//!
//! Reply engine of the Nocino chat bot: a Markov chain trained online from
//! the conversation, two hoards of media (stickers and clips) and the dice
//! that decide which of them answers a message.
//!
//! The transport (receiving messages, uploading replies, downloading
//! attachments) lives in the service crate and plugs in through
//! [`media::MediaFetcher`] and the [`protocol`] types.

pub mod chain;
pub mod feed;
pub mod handler;
pub mod media;
pub mod protocol;
pub mod selector;
pub mod stats;

use anyhow::Result;
use std::sync::Arc;

pub use chain::ChainStore;
pub use feed::{FeedLimits, TrainingFeed};
pub use handler::{HandlerConfig, MessageHandler};
pub use media::{MediaFetcher, MediaKind, MediaRegistry};
pub use protocol::{Attachment, ChatKind, InboundMessage, Reply};
pub use selector::{ReplyKind, ResponseSelector};
pub use stats::Stats;

/// The process-wide stores, shared by every message task.
#[derive(Debug, Clone)]
pub struct Stores {
    pub chain: Arc<ChainStore>,
    pub stickers: Arc<MediaRegistry>,
    pub clips: Arc<MediaRegistry>,
}

impl Stores {
    pub fn new(chain: ChainStore, stickers: MediaRegistry, clips: MediaRegistry) -> Self {
        Self {
            chain: Arc::new(chain),
            stickers: Arc::new(stickers),
            clips: Arc::new(clips),
        }
    }

    /// Seeds both registries from their directories.
    pub async fn load_media(&self) -> Result<()> {
        self.stickers.load_existing().await?;
        self.clips.load_existing().await?;
        Ok(())
    }
}
