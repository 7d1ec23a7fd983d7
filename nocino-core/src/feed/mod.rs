use std::sync::Arc;
use tracing::{debug, error};

use crate::media::{MediaFetcher, MediaRegistry};
use crate::protocol::{Attachment, InboundMessage};
use crate::Stores;

/// Only documents of this type are hoarded as clips.
pub const CLIP_MIME_TYPE: &str = "video/mp4";

/// Attachments at or above these sizes (bytes) are not hoarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedLimits {
    pub sticker_max_size: u64,
    pub clip_max_size: u64,
}

/// What a single message contributed to the stores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedReport {
    pub trained: bool,
    pub sticker: Option<String>,
    pub clip: Option<String>,
}

/// Feeds every processed message back into the stores.
pub struct TrainingFeed {
    stores: Stores,
    limits: FeedLimits,
    fetcher: Arc<dyn MediaFetcher>,
}

impl std::fmt::Debug for TrainingFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingFeed")
            .field("stores", &self.stores)
            .field("limits", &self.limits)
            .field("fetcher", &"Arc<dyn MediaFetcher>")
            .finish()
    }
}

impl TrainingFeed {
    pub fn new(stores: Stores, limits: FeedLimits, fetcher: Arc<dyn MediaFetcher>) -> Self {
        Self {
            stores,
            limits,
            fetcher,
        }
    }

    /// Trains the chain on `tokens` and hoards the message's sticker or clip.
    /// The three steps are independent; a failed hoard is logged and skipped.
    pub async fn ingest(&self, message: &InboundMessage, tokens: &[String]) -> FeedReport {
        let mut report = FeedReport::default();

        if !tokens.is_empty() {
            debug!(chat_id = message.chat_id, tokens = ?tokens, "Saving tokens to chain");
            self.stores.chain.train_tokens(tokens).await;
            report.trained = true;
        }

        if let Some(sticker) = message
            .sticker
            .as_ref()
            .filter(|s| s.file_size < self.limits.sticker_max_size)
        {
            report.sticker = self.hoard(&self.stores.stickers, sticker).await;
        }

        if let Some(clip) = message.document.as_ref().filter(|d| {
            d.mime_type.as_deref() == Some(CLIP_MIME_TYPE) && d.file_size < self.limits.clip_max_size
        }) {
            report.clip = self.hoard(&self.stores.clips, clip).await;
        }

        report
    }

    async fn hoard(&self, registry: &MediaRegistry, attachment: &Attachment) -> Option<String> {
        match registry.hoard(&attachment.file_id, self.fetcher.as_ref()).await {
            Ok(identifier) => {
                debug!(kind = %registry.kind(), identifier = %identifier, "Saving media to registry");
                registry.add(identifier.clone()).await;
                Some(identifier)
            }
            Err(e) => {
                error!(
                    kind = %registry.kind(),
                    file_id = %attachment.file_id,
                    error = %format!("{e:#}"),
                    "Could not hoard media"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{tokenize, ChainStore};
    use crate::media::MediaKind;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    struct EchoFetcher;

    #[async_trait]
    impl MediaFetcher for EchoFetcher {
        async fn fetch(&self, file_id: &str) -> Result<Vec<u8>> {
            if file_id.starts_with("broken") {
                return Err(anyhow!("404 for {}", file_id));
            }
            Ok(file_id.as_bytes().to_vec())
        }
    }

    const LIMITS: FeedLimits = FeedLimits {
        sticker_max_size: 100,
        clip_max_size: 1_000,
    };

    fn message(text: &str) -> InboundMessage {
        serde_json::from_value(serde_json::json!({
            "chat_id": 1, "message_id": 1, "sender_id": 1, "text": text
        }))
        .unwrap()
    }

    fn attachment(file_id: &str, file_size: u64, mime_type: Option<&str>) -> Attachment {
        Attachment {
            file_id: file_id.to_string(),
            file_size,
            mime_type: mime_type.map(str::to_string),
        }
    }

    async fn feed_in(dir: &std::path::Path) -> TrainingFeed {
        let stores = Stores::new(
            ChainStore::default(),
            MediaRegistry::new(MediaKind::Sticker, dir.join("sticker")),
            MediaRegistry::new(MediaKind::Clip, dir.join("gif")),
        );
        stores.load_media().await.unwrap();
        TrainingFeed::new(stores, LIMITS, Arc::new(EchoFetcher))
    }

    #[tokio::test]
    async fn trains_on_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let feed = feed_in(dir.path()).await;
        let msg = message("good morning everyone");

        let report = feed.ingest(&msg, &tokenize(&msg.text)).await;
        assert!(report.trained);
        assert_eq!(feed.stores.chain.suffixes("good").await, vec!["morning"]);
    }

    #[tokio::test]
    async fn empty_tokens_skip_training() {
        let dir = tempfile::tempdir().unwrap();
        let feed = feed_in(dir.path()).await;

        let report = feed.ingest(&message(""), &[]).await;
        assert_eq!(report, FeedReport::default());
        assert!(feed.stores.chain.is_empty().await);
    }

    #[tokio::test]
    async fn hoards_small_stickers_only() {
        let dir = tempfile::tempdir().unwrap();
        let feed = feed_in(dir.path()).await;

        let mut small = message("");
        small.sticker = Some(attachment("small", 99, None));
        let report = feed.ingest(&small, &[]).await;
        assert_eq!(report.sticker.as_deref(), Some("small.webp"));
        assert!(dir.path().join("sticker/small.webp").exists());

        let mut big = message("");
        big.sticker = Some(attachment("big", 100, None));
        assert!(feed.ingest(&big, &[]).await.sticker.is_none());

        assert_eq!(feed.stores.stickers.len().await, 1);
    }

    #[tokio::test]
    async fn hoards_mp4_documents_as_clips() {
        let dir = tempfile::tempdir().unwrap();
        let feed = feed_in(dir.path()).await;

        let mut clip = message("");
        clip.document = Some(attachment("loop", 500, Some("video/mp4")));
        assert_eq!(feed.ingest(&clip, &[]).await.clip.as_deref(), Some("loop.mp4"));

        let mut pdf = message("");
        pdf.document = Some(attachment("paper", 500, Some("application/pdf")));
        assert!(feed.ingest(&pdf, &[]).await.clip.is_none());

        let mut huge = message("");
        huge.document = Some(attachment("movie", 1_000, Some("video/mp4")));
        assert!(feed.ingest(&huge, &[]).await.clip.is_none());

        assert_eq!(feed.stores.clips.len().await, 1);
    }

    #[tokio::test]
    async fn failed_hoard_does_not_block_other_steps() {
        let dir = tempfile::tempdir().unwrap();
        let feed = feed_in(dir.path()).await;

        let mut msg = message("caption text");
        msg.sticker = Some(attachment("broken-sticker", 10, None));
        msg.document = Some(attachment("fine", 10, Some("video/mp4")));

        let report = feed.ingest(&msg, &tokenize(&msg.text)).await;
        assert!(report.trained);
        assert!(report.sticker.is_none());
        assert_eq!(report.clip.as_deref(), Some("fine.mp4"));
        assert!(feed.stores.stickers.is_empty().await);
        assert_eq!(feed.stores.clips.len().await, 1);
    }
}
