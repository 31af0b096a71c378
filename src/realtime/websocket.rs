//! WebSocket connector for the realtime endpoint.
//!
//! The handshake authenticates through the `Sec-WebSocket-Protocol` header
//! (the browser-compatible scheme), so no `Authorization` header is needed.
//! After the upgrade a single task pumps frames in both directions.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::transport::{Connector, InboundFrame, Link, OUTBOUND_CAPACITY};
use crate::credentials::SessionToken;
use crate::error::{Result, SessionError};

/// Capacity of the inbound frame channel
const INBOUND_CAPACITY: usize = 256;

/// Opens realtime sessions over `tokio-tungstenite`
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

/// Sub-protocol list carrying the ephemeral credential
pub fn subprotocols(token: &str) -> String {
    format!("realtime, openai-insecure-api-key.{token}, openai-beta.realtime-v1")
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &str, token: &SessionToken) -> Result<Link> {
        let mut request = url
            .into_client_request()
            .map_err(|e| SessionError::Handshake(format!("invalid endpoint {url}: {e}")))?;

        let protocols = HeaderValue::from_str(&subprotocols(&token.value))
            .map_err(|_| SessionError::Handshake("token is not a valid header value".into()))?;
        let headers = request.headers_mut();
        headers.insert("Sec-WebSocket-Protocol", protocols);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        info!("Opening realtime connection to {}", url);
        let (ws_stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SessionError::Handshake(e.to_string()))?;
        debug!("Handshake response status: {}", response.status());

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<InboundFrame>(INBOUND_CAPACITY);

        tokio::spawn(async move {
            let end = loop {
                tokio::select! {
                    outbound = out_rx.recv() => match outbound {
                        Some(text) => {
                            if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                                error!("Failed to send WebSocket message: {}", e);
                                break Some(InboundFrame::Failed(e.to_string()));
                            }
                        }
                        None => {
                            // Owner dropped the link
                            let _ = ws_sink.send(Message::Close(None)).await;
                            break None;
                        }
                    },

                    inbound = ws_stream.next() => match inbound {
                        Some(Ok(Message::Text(text))) => {
                            if in_tx.send(InboundFrame::Text(text.to_string())).await.is_err() {
                                break None;
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_sink.send(Message::Pong(data)).await {
                                warn!("Failed to send pong: {}", e);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!("WebSocket closed by server");
                            let reason = frame.map(|f| f.reason.as_str().to_string());
                            break Some(InboundFrame::Closed(reason));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("WebSocket error: {}", e);
                            break Some(InboundFrame::Failed(e.to_string()));
                        }
                        None => break Some(InboundFrame::Closed(None)),
                    },
                }
            };

            if let Some(frame) = end {
                let _ = in_tx.send(frame).await;
            }
            debug!("WebSocket pump stopped");
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subprotocols_embed_token() {
        assert_eq!(
            subprotocols("ek_123"),
            "realtime, openai-insecure-api-key.ek_123, openai-beta.realtime-v1"
        );
    }

    #[tokio::test]
    async fn test_invalid_url_is_handshake_error() {
        let token = SessionToken::new("ek_123", None);
        let err = WebSocketConnector::new()
            .open("not a url", &token)
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Handshake);
    }
}
