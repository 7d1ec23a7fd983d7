use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::chain::tokenize;
use crate::feed::TrainingFeed;
use crate::media::MediaRegistry;
use crate::protocol::{ChatKind, InboundMessage, Reply};
use crate::selector::{ReplyKind, ResponseSelector};
use crate::Stores;

pub const DEFAULT_MAX_WORDS: usize = 30;

#[derive(Debug, Clone)]
pub struct HandlerConfig {
    /// Always `@`-prefixed.
    pub bot_username: String,
    pub trusted_ids: HashSet<i64>,
    pub max_words: usize,
}

impl HandlerConfig {
    pub fn new(bot_username: &str, trusted_ids: HashSet<i64>, max_words: usize) -> Self {
        let bare = bot_username.trim().trim_start_matches('@');
        Self {
            bot_username: format!("@{bare}"),
            trusted_ids,
            max_words,
        }
    }

    fn is_bot(&self, username: &str) -> bool {
        let bot = self.bot_username.trim_start_matches('@');
        !bot.is_empty() && bot.eq_ignore_ascii_case(username.trim_start_matches('@'))
    }
}

/// Outcome of looking at a message before any store is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triage {
    pub answer_required: bool,
    /// Words to learn from, without a leading mention of the bot.
    pub tokens: Vec<String>,
}

/// Handles one inbound message end to end: decide, reply, learn.
#[derive(Debug)]
pub struct MessageHandler {
    config: HandlerConfig,
    stores: Stores,
    selector: ResponseSelector,
    feed: TrainingFeed,
}

impl MessageHandler {
    pub fn new(
        config: HandlerConfig,
        stores: Stores,
        selector: ResponseSelector,
        feed: TrainingFeed,
    ) -> Self {
        Self {
            config,
            stores,
            selector,
            feed,
        }
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Returns the reply to send, if any. Every message that passes triage is
    /// fed back into the stores afterwards, replied to or not.
    pub async fn handle(&self, message: &InboundMessage) -> Option<Reply> {
        debug!(
            chat_id = message.chat_id,
            message_id = message.message_id,
            username = ?message.sender_username,
            text = %message.text,
            "Incoming message"
        );

        let triage = self.triage(message)?;

        let reply = if triage.answer_required {
            self.respond(message).await
        } else {
            None
        };
        if let Some(reply) = &reply {
            info!(
                chat_id = message.chat_id,
                kind = ?reply.kind(),
                latency_ms = message.waited(Utc::now()).as_millis() as u64,
                "Reply ready"
            );
        }

        self.feed.ingest(message, &triage.tokens).await;
        reply
    }

    /// `None` drops the message entirely (untrusted private chat).
    pub fn triage(&self, message: &InboundMessage) -> Option<Triage> {
        let mut answer_required = false;

        if message.chat_kind == ChatKind::Private {
            if !self.config.trusted_ids.contains(&message.sender_id) {
                warn!(
                    sender_id = message.sender_id,
                    username = ?message.sender_username,
                    "Unauthorized private chat, ignoring"
                );
                return None;
            }
            info!(sender_id = message.sender_id, asking = %message.text, "Authorized private chat");
            answer_required = true;
        }

        let mut tokens = tokenize(&message.text);

        if let Some(to) = message.reply_to_username.as_deref() {
            if self.config.is_bot(to) {
                info!(chat_id = message.chat_id, asking = %message.text, "Reply to us");
                answer_required = true;
            }
        }

        let mentioned = tokens
            .first()
            .map(|first| first.eq_ignore_ascii_case(&self.config.bot_username))
            .unwrap_or(false);
        if mentioned {
            tokens.remove(0);
            info!(chat_id = message.chat_id, asking = %tokens.join(" "), "Mention to us");
            answer_required = true;
        }

        Some(Triage {
            answer_required,
            tokens,
        })
    }

    async fn respond(&self, message: &InboundMessage) -> Option<Reply> {
        let has_stickers = !self.stores.stickers.is_empty().await;
        let has_clips = !self.stores.clips.is_empty().await;
        let has_chain = !self.stores.chain.is_empty().await;

        match self.selector.select(has_stickers, has_clips, has_chain) {
            ReplyKind::Sticker => {
                let path = pick(&self.stores.stickers).await;
                info!(chat_id = message.chat_id, path = %path.display(), "Sending sticker");
                Some(Reply::Sticker {
                    chat_id: message.chat_id,
                    reply_to_message_id: message.message_id,
                    path,
                })
            }
            ReplyKind::Clip => {
                let path = pick(&self.stores.clips).await;
                info!(chat_id = message.chat_id, path = %path.display(), "Sending clip");
                Some(Reply::Clip {
                    chat_id: message.chat_id,
                    reply_to_message_id: message.message_id,
                    path,
                })
            }
            ReplyKind::Text => {
                let (text, elapsed) = self
                    .stores
                    .chain
                    .generate(self.config.max_words, &message.text)
                    .await;
                if text.is_empty() {
                    warn!(chat_id = message.chat_id, "Generated an empty sentence, not replying");
                    return None;
                }
                info!(
                    chat_id = message.chat_id,
                    elapsed = ?elapsed,
                    response = %text,
                    "Sending response"
                );
                Some(Reply::Text {
                    chat_id: message.chat_id,
                    reply_to_message_id: message.message_id,
                    text,
                    elapsed_ms: elapsed.as_millis() as u64,
                })
            }
            ReplyKind::None => {
                warn!(chat_id = message.chat_id, "Not replying, Markov chain is empty");
                None
            }
        }
    }
}

async fn pick(registry: &MediaRegistry) -> std::path::PathBuf {
    let identifier = registry.get_random().await;
    registry.path_of(&identifier)
}
