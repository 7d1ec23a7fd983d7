use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

mod config;
mod fetcher;
mod protocol;

use config::Config;
use fetcher::HttpMediaFetcher;
use nocino_core::stats::spawn_stats_ticker;
use nocino_core::{
    ChainStore, FeedLimits, HandlerConfig, InboundMessage, MediaKind, MediaRegistry,
    MessageHandler, ResponseSelector, Stats, Stores, TrainingFeed,
};
use protocol::OutboundFrame;

// --- API Shared State ---
// One handler (and therefore one set of stores) for every connected bridge.
pub struct ApiState {
    handler: Arc<MessageHandler>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nocino_chat_backend=info,nocino_core=info".into()),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().context("Invalid configuration")?;

    let stores = Stores::new(
        ChainStore::new(config.prefix_len),
        MediaRegistry::new(MediaKind::Sticker, &config.sticker_store),
        MediaRegistry::new(MediaKind::Clip, &config.gif_store),
    );
    stores
        .load_media()
        .await
        .context("Cannot initialize media stores, exiting")?;

    let handler = build_handler(&config, stores.clone())?;
    let _stats_ticker = spawn_stats_ticker(stores, config.stats_interval);

    let state = Arc::new(ApiState {
        handler: Arc::new(handler),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let stores = state.handler.stores();
    info!(
        addr = %config.bind_addr,
        bot = %state.handler.config().bot_username,
        sticker_store = %stores.stickers.store().display(),
        clip_store = %stores.clips.store().display(),
        "Nocino chat backend listening"
    );

    axum::serve(listener, router(state).into_make_service()).await?;
    Ok(())
}

fn build_handler(config: &Config, stores: Stores) -> Result<MessageHandler> {
    let fetcher = HttpMediaFetcher::new(&config.media_resolver_url)?;
    let feed = TrainingFeed::new(
        stores.clone(),
        FeedLimits {
            sticker_max_size: config.sticker_max_size,
            clip_max_size: config.gif_max_size,
        },
        Arc::new(fetcher),
    );
    Ok(MessageHandler::new(
        HandlerConfig::new(&config.bot_username, config.trusted_ids.clone(), config.num_words),
        stores,
        ResponseSelector::new(),
        feed,
    ))
}

fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/stats", get(stats))
        .route("/ws/updates", get(ws_handler))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    (axum::http::StatusCode::OK, "Nocino Chat Backend Operational")
}

async fn stats(State(state): State<Arc<ApiState>>) -> Json<Stats> {
    Json(Stats::collect(state.handler.stores()).await)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Every inbound frame is handled in its own task; replies are funneled back
/// through a single writer as they complete, in no particular order.
async fn handle_socket(socket: WebSocket, state: Arc<ApiState>) {
    let connection_id = Uuid::new_v4();
    info!(connection_id = %connection_id, "Transport bridge connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.to_json())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                let message: InboundMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        error!(connection_id = %connection_id, error = %e, "Invalid InboundMessage JSON");
                        let _ = tx.send(OutboundFrame::status("invalid_message", Some(e.to_string())));
                        continue;
                    }
                };

                let handler = state.handler.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    if let Some(reply) = handler.handle(&message).await {
                        debug!(connection_id = %connection_id, chat_id = reply.chat_id(), "Queueing reply frame");
                        let _ = tx.send(OutboundFrame::Reply(reply));
                    }
                });
            }
            Message::Close(_) => {
                info!(connection_id = %connection_id, "Transport bridge closed the connection");
                break;
            }
            _ => {}
        }
    }

    // The writer stops once every in-flight message task has dropped its sender.
    drop(tx);
    if let Err(e) = writer.await {
        error!(connection_id = %connection_id, error = %e, "Reply writer task failed");
    }
    info!(connection_id = %connection_id, "Transport bridge disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::collections::HashSet;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn spawn_backend() -> (SocketAddr, Arc<ApiState>) {
        let config = Config::from_lookup(|_| None).unwrap();
        let stores = Stores::new(
            ChainStore::default(),
            MediaRegistry::new(MediaKind::Sticker, &config.sticker_store),
            MediaRegistry::new(MediaKind::Clip, &config.gif_store),
        );
        stores.chain.train("hello world again").await;

        let state = Arc::new(ApiState {
            handler: Arc::new(build_handler(&config, stores).unwrap()),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.unwrap();
        });
        (addr, state)
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (client, _) = connect_async(format!("ws://{addr}/ws/updates")).await.unwrap();
        client
    }

    async fn next_frame(client: &mut Client) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("no frame within 5s")
                .expect("socket closed")
                .unwrap();
            if let WsMessage::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    fn mention(message_id: i64, text: &str) -> WsMessage {
        WsMessage::Text(
            serde_json::json!({
                "chat_id": 5,
                "message_id": message_id,
                "sender_id": 1,
                "text": format!("@nocino {text}"),
            })
            .to_string(),
        )
    }

    #[tokio::test]
    async fn bad_json_gets_a_status_frame_and_the_socket_stays_open() {
        let (addr, _) = spawn_backend().await;
        let mut client = connect(addr).await;

        client.send(WsMessage::Text("{not json".into())).await.unwrap();
        let frame = next_frame(&mut client).await;
        assert_eq!(frame["type"], "status_update");
        assert_eq!(frame["status"], "invalid_message");
        assert!(frame["details"].as_str().is_some_and(|d| !d.is_empty()));

        client.send(mention(9, "hello")).await.unwrap();
        let frame = next_frame(&mut client).await;
        assert_eq!(frame["type"], "text_reply");
        assert_eq!(frame["chat_id"], 5);
        assert_eq!(frame["reply_to_message_id"], 9);
        assert_eq!(frame["text"], "hello world again");

        client.close(None).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_frames_all_get_their_reply() {
        let (addr, state) = spawn_backend().await;
        let mut client = connect(addr).await;

        for id in 1..=8 {
            client.send(mention(id, &format!("hello word{id}"))).await.unwrap();
        }

        let mut answered = HashSet::new();
        for _ in 1..=8 {
            let frame = next_frame(&mut client).await;
            assert_eq!(frame["type"], "text_reply");
            answered.insert(frame["reply_to_message_id"].as_i64().unwrap());
        }
        assert_eq!(answered, (1..=8).collect::<HashSet<i64>>());

        // every message task trains after replying
        tokio::time::timeout(Duration::from_secs(5), async {
            while state.handler.stores().chain.suffixes("hello").await.len() < 9 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("chain never saw every message");

        client.close(None).await.unwrap();
    }
}
