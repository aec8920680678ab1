//! Push source for propagation clients running outside the server.
//!
//! Subscribes by opening `/api/session/:id/live` and turning the server's
//! messages back into subscription events:
//!
//! | Server message                         | Event                      |
//! |----------------------------------------|----------------------------|
//! | `connected`                            | `Subscribed`               |
//! | `session.snapshot`, `session.updated`  | `Snapshot`                 |
//! | `error`                                | `ChannelError`, then ends  |
//! | close frame or end of stream           | `Closed`                   |
//!
//! Presence and pong messages are not session changes and are dropped.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::domain::foundation::SessionId;
use crate::domain::session::Session;
use crate::ports::{
    ChangeNotifier, NotifyError, Subscription, SubscriptionEvent, SubscriptionSink,
    SubscriptionStatus,
};

use super::messages::ServerMessage;

const CLIENT_AGENT: &str = concat!("planning-poker/", env!("CARGO_PKG_VERSION"));

/// Receive-only change notifier backed by the server's live endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketChangeNotifier {
    /// `ws://` or `wss://` server root.
    base_url: String,
    connect_timeout: Duration,
}

impl WebSocketChangeNotifier {
    /// `base_url` is the server root, e.g. `http://127.0.0.1:8080`.
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, NotifyError> {
        Ok(Self {
            base_url: websocket_base(base_url)?,
            connect_timeout,
        })
    }

    fn live_url(&self, session_id: &SessionId) -> String {
        format!("{}/api/session/{}/live", self.base_url, session_id)
    }
}

fn websocket_base(base_url: &str) -> Result<String, NotifyError> {
    let base = base_url.trim_end_matches('/');
    let mapped = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(NotifyError::Unavailable(format!(
            "unsupported server url: {}",
            base_url
        )));
    };
    Ok(mapped)
}

#[async_trait]
impl ChangeNotifier for WebSocketChangeNotifier {
    /// Watchers never write; commits are published by the server itself.
    async fn publish(&self, session: &Session) -> Result<(), NotifyError> {
        Err(NotifyError::Unavailable(format!(
            "cannot publish session {} through a live socket",
            session.id()
        )))
    }

    async fn subscribe(&self, session_id: &SessionId) -> Result<Subscription, NotifyError> {
        let mut request = self
            .live_url(session_id)
            .into_client_request()
            .map_err(|e| NotifyError::Unavailable(e.to_string()))?;
        request
            .headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static(CLIENT_AGENT));

        let (sink, subscription) = Subscription::channel(session_id.clone());
        let timeout = self.connect_timeout;
        tokio::spawn(async move {
            listen(request, timeout, sink).await;
        });

        Ok(subscription)
    }
}

async fn listen(
    request: tokio_tungstenite::tungstenite::handshake::client::Request,
    timeout: Duration,
    mut sink: SubscriptionSink,
) {
    let url = request.uri().to_string();
    let socket = tokio::select! {
        _ = sink.cancelled() => return,
        connected = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(request)) => match connected {
            Ok(Ok((socket, _response))) => socket,
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, "Live socket connect failed");
                sink.send(SubscriptionEvent::Status(SubscriptionStatus::ChannelError(
                    e.to_string(),
                )))
                .await;
                return;
            }
            Err(_) => {
                warn!(url = %url, "Live socket connect timed out");
                sink.send(SubscriptionEvent::Status(SubscriptionStatus::TimedOut)).await;
                return;
            }
        },
    };
    debug!(url = %url, "Live socket open");

    let (mut writer, mut reader) = socket.split();
    loop {
        tokio::select! {
            _ = sink.cancelled() => {
                let _ = writer.send(Message::Close(None)).await;
                return;
            }
            frame = reader.next() => {
                let event = match frame {
                    Some(Ok(Message::Text(text))) => match event_for(&text) {
                        Decoded::Event(event) => event,
                        Decoded::Final(event) => {
                            sink.send(event).await;
                            let _ = writer.send(Message::Close(None)).await;
                            return;
                        }
                        Decoded::Skip => continue,
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        sink.send(SubscriptionEvent::Status(SubscriptionStatus::Closed)).await;
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        sink.send(SubscriptionEvent::Status(SubscriptionStatus::ChannelError(
                            e.to_string(),
                        )))
                        .await;
                        return;
                    }
                };
                if !sink.send(event).await {
                    let _ = writer.send(Message::Close(None)).await;
                    return;
                }
            }
        }
    }
}

#[derive(Debug, PartialEq)]
enum Decoded {
    Event(SubscriptionEvent),
    /// Deliver, then stop listening.
    Final(SubscriptionEvent),
    Skip,
}

fn event_for(text: &str) -> Decoded {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(ServerMessage::Connected(_)) => {
            Decoded::Event(SubscriptionEvent::Status(SubscriptionStatus::Subscribed))
        }
        Ok(ServerMessage::SessionSnapshot(message)) | Ok(ServerMessage::SessionUpdated(message)) => {
            Decoded::Event(SubscriptionEvent::Snapshot(message.session))
        }
        Ok(ServerMessage::Error(error)) => Decoded::Final(SubscriptionEvent::Status(
            SubscriptionStatus::ChannelError(format!("{}: {}", error.code, error.message)),
        )),
        Ok(_) => Decoded::Skip,
        Err(e) => {
            debug!(error = %e, "Ignoring unrecognised live message");
            Decoded::Skip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ParticipantId, Timestamp};
    use crate::domain::session::{Nickname, DEFAULT_SESSION_TTL};

    fn session() -> Session {
        Session::create(
            SessionId::generate(),
            ParticipantId::generate(),
            Nickname::parse("Host").unwrap(),
            Timestamp::now(),
            DEFAULT_SESSION_TTL,
        )
    }

    #[test]
    fn http_roots_map_to_websocket_schemes() {
        assert_eq!(websocket_base("http://localhost:8080/").unwrap(), "ws://localhost:8080");
        assert_eq!(websocket_base("https://poker.example").unwrap(), "wss://poker.example");
        assert_eq!(websocket_base("ws://10.0.0.1:9000").unwrap(), "ws://10.0.0.1:9000");
        assert!(websocket_base("ftp://poker.example").is_err());
    }

    #[test]
    fn live_url_targets_the_session_endpoint() {
        let notifier = WebSocketChangeNotifier::new("http://localhost:8080", Duration::from_secs(1)).unwrap();
        let id = SessionId::new("abcDEF123_-x").unwrap();

        assert_eq!(
            notifier.live_url(&id),
            "ws://localhost:8080/api/session/abcDEF123_-x/live"
        );
    }

    #[test]
    fn server_messages_become_subscription_events() {
        let connected = serde_json::to_string(&ServerMessage::connected("s", "c")).unwrap();
        assert_eq!(
            event_for(&connected),
            Decoded::Event(SubscriptionEvent::Status(SubscriptionStatus::Subscribed))
        );

        let record = session();
        let updated = serde_json::to_string(&ServerMessage::updated(record.clone())).unwrap();
        assert_eq!(event_for(&updated), Decoded::Event(SubscriptionEvent::Snapshot(record)));

        let pong = serde_json::to_string(&ServerMessage::pong()).unwrap();
        assert_eq!(event_for(&pong), Decoded::Skip);
        assert_eq!(event_for("not json"), Decoded::Skip);
    }

    #[test]
    fn server_error_ends_the_subscription() {
        let error = serde_json::to_string(&ServerMessage::error("SUBSCRIPTION_LOST", "Closed")).unwrap();

        match event_for(&error) {
            Decoded::Final(SubscriptionEvent::Status(status)) => {
                assert!(status.is_failure());
                assert_eq!(
                    status,
                    SubscriptionStatus::ChannelError("SUBSCRIPTION_LOST: Closed".to_string())
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn publishing_through_a_watcher_is_refused() {
        let notifier = WebSocketChangeNotifier::new("http://localhost:8080", Duration::from_secs(1)).unwrap();

        assert!(matches!(
            notifier.publish(&session()).await,
            Err(NotifyError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_server_reports_channel_error() {
        // Port 9 (discard) is almost never listening.
        let notifier = WebSocketChangeNotifier::new("http://127.0.0.1:9", Duration::from_secs(5)).unwrap();
        let mut subscription = notifier.subscribe(&SessionId::generate()).await.unwrap();

        match subscription.next().await {
            Some(SubscriptionEvent::Status(status)) => assert!(status.is_failure()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
