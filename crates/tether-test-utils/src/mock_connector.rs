// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock connector for deterministic transport tests.
//!
//! `MockConnector` implements `Connector` with a script of handshake
//! outcomes. Every accepted handshake produces a [`MockPeer`], the server
//! end of the link, which tests use to read what the client sent and to
//! push frames or a close back.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use tether_core::{Connector, Frame, Link, LinkEvent, TetherError, TransportMessage};

/// Outcome of one scripted handshake.
#[derive(Debug, Clone)]
enum Outcome {
    Accept,
    AcceptAfter(Duration),
    Refuse(String),
    Hang,
}

/// A scripted `Connector`.
///
/// Handshakes consume the script front to back. Once it runs out every
/// handshake is accepted.
pub struct MockConnector {
    script: Mutex<VecDeque<Outcome>>,
    urls: Mutex<Vec<String>>,
    peers_tx: mpsc::UnboundedSender<MockPeer>,
    peers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockPeer>>,
}

impl MockConnector {
    pub fn new() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            script: Mutex::new(VecDeque::new()),
            urls: Mutex::new(Vec::new()),
            peers_tx,
            peers_rx: tokio::sync::Mutex::new(peers_rx),
        }
    }

    /// Queue a successful handshake.
    pub fn accept(&self) -> &Self {
        self.script.lock().push_back(Outcome::Accept);
        self
    }

    /// Queue a handshake that succeeds after `delay`.
    pub fn accept_after(&self, delay: Duration) -> &Self {
        self.script.lock().push_back(Outcome::AcceptAfter(delay));
        self
    }

    /// Queue a refused handshake.
    pub fn refuse(&self, reason: &str) -> &Self {
        self.script.lock().push_back(Outcome::Refuse(reason.to_string()));
        self
    }

    /// Queue a handshake that never completes.
    pub fn hang(&self) -> &Self {
        self.script.lock().push_back(Outcome::Hang);
        self
    }

    /// Every URL passed to `open`, in call order.
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    pub fn attempts(&self) -> usize {
        self.urls.lock().len()
    }

    /// Waits for the server end of the next accepted handshake.
    pub async fn next_peer(&self) -> MockPeer {
        let mut rx = self.peers_rx.lock().await;
        match rx.recv().await {
            Some(peer) => peer,
            // The sender lives in `self`, so the channel cannot close.
            None => unreachable!("peer channel closed"),
        }
    }

    fn link(&self) -> Link {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let _ = self.peers_tx.send(MockPeer {
            to_client: inbound_tx,
            from_client: outbound_rx,
        });
        Link {
            outbound: outbound_tx,
            inbound: inbound_rx,
        }
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, url: &str) -> Result<Link, TetherError> {
        self.urls.lock().push(url.to_string());
        let outcome = self.script.lock().pop_front().unwrap_or(Outcome::Accept);
        match outcome {
            Outcome::Accept => Ok(self.link()),
            Outcome::AcceptAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.link())
            }
            Outcome::Refuse(reason) => Err(TetherError::transport(reason)),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

/// Server end of a mock link.
#[derive(Debug)]
pub struct MockPeer {
    to_client: mpsc::UnboundedSender<LinkEvent>,
    from_client: mpsc::UnboundedReceiver<Frame>,
}

impl MockPeer {
    /// Push a raw text frame to the client.
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(LinkEvent::Text(text.into()));
    }

    /// Push a JSON envelope to the client.
    pub fn send_message(&self, message: &TransportMessage) {
        if let Ok(text) = serde_json::to_string(message) {
            self.send_text(text);
        }
    }

    /// Close the link from the server side.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(LinkEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Next frame written by the client, or `None` once the client dropped the link.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    /// Next text frame decoded as an envelope, skipping anything else.
    pub async fn next_message(&mut self) -> Option<TransportMessage> {
        while let Some(frame) = self.from_client.recv().await {
            if let Frame::Text(text) = frame
                && let Ok(message) = serde_json::from_str(&text)
            {
                return Some(message);
            }
        }
        None
    }

    /// Every envelope already written by the client, without waiting.
    pub fn drain_messages(&mut self) -> Vec<TransportMessage> {
        let mut out = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            if let Frame::Text(text) = frame
                && let Ok(message) = serde_json::from_str(&text)
            {
                out.push(message);
            }
        }
        out
    }

    /// Every frame already written by the client, without waiting.
    pub fn drain_frames(&mut self) -> Vec<Frame> {
        let mut out = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            out.push(frame);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn follows_script_then_accepts() {
        let connector = MockConnector::new();
        connector.refuse("down").accept();

        assert!(connector.open("ws://a").await.is_err());
        assert!(connector.open("ws://b").await.is_ok());
        assert!(connector.open("ws://c").await.is_ok());
        assert_eq!(connector.urls(), vec!["ws://a", "ws://b", "ws://c"]);
    }

    #[tokio::test]
    async fn peer_sees_client_frames_and_can_reply() {
        let connector = MockConnector::new();
        let mut link = connector.open("ws://x").await.unwrap();
        let mut peer = connector.next_peer().await;

        link.outbound.send(Frame::Text("hello".into())).unwrap();
        assert_eq!(peer.next_frame().await, Some(Frame::Text("hello".into())));

        peer.send_text("back");
        assert_eq!(link.inbound.recv().await, Some(LinkEvent::Text("back".into())));

        peer.close(1006, "gone");
        assert!(matches!(
            link.inbound.recv().await,
            Some(LinkEvent::Closed { code: 1006, .. })
        ));
    }
}
