// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket connector over tokio-tungstenite.
//!
//! The socket is split into a writer pump fed by the link's outbound
//! channel and a reader pump feeding its inbound channel. Dropping the
//! outbound sender closes the socket.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, trace};

use tether_core::traits::connector::CLOSE_ABNORMAL;
use tether_core::{Connector, Frame, Link, LinkEvent, TetherError};

/// Close code reported when the peer closed without a status.
const CLOSE_NO_STATUS: u16 = 1005;

/// [`Connector`] opening `ws://` and `wss://` connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Link, TetherError> {
        let (socket, _response) =
            tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| TetherError::Transport {
                    message: format!("websocket handshake failed: {e}"),
                    source: Some(Box::new(e)),
                })?;
        debug!("websocket handshake complete");

        let (mut sink, mut stream) = socket.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<LinkEvent>();

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let (message, closing) = match frame {
                    Frame::Text(text) => (Message::Text(text.into()), false),
                    Frame::Close { code, reason } => (
                        Message::Close(Some(CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        })),
                        true,
                    ),
                };
                if let Err(e) = sink.send(message).await {
                    debug!(error = %e, "websocket write failed");
                    return;
                }
                if closing {
                    return;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            let closed = loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if inbound_tx
                            .send(LinkEvent::Text(text.as_str().to_string()))
                            .is_err()
                        {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => LinkEvent::Closed {
                                code: u16::from(frame.code),
                                reason: frame.reason.as_str().to_string(),
                            },
                            None => LinkEvent::Closed {
                                code: CLOSE_NO_STATUS,
                                reason: String::new(),
                            },
                        };
                    }
                    Some(Ok(other)) => {
                        trace!(kind = ?other, "ignoring non-text websocket frame");
                    }
                    Some(Err(e)) => {
                        break LinkEvent::Closed {
                            code: CLOSE_ABNORMAL,
                            reason: e.to_string(),
                        };
                    }
                    None => {
                        break LinkEvent::Closed {
                            code: CLOSE_ABNORMAL,
                            reason: "stream ended".to_string(),
                        };
                    }
                }
            };
            let _ = inbound_tx.send(closed);
        });

        Ok(Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
