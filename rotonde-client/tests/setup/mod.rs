/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rotonde_client::prelude::*;

// Ensures tracing initialization happens only once across all tests.
static INIT: Once = Once::new();

/// Initializes the global tracing subscriber for tests.
///
/// Uses `std::sync::Once` so that initialization runs only once even when
/// called from multiple tests. The filter honors `RUST_LOG` and defaults
/// to `info`.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_env_filter(filter)
            .with_test_writer()
            .compact()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Bounds a future so a broken wait fails the test instead of hanging it.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .expect("test wait timed out")
}

/// An in-memory transport; every `open` call yields a fresh session the
/// hub side picks up with [`RemoteHub::session`].
pub struct MemoryTransport {
    sessions: mpsc::UnboundedSender<RemoteEnd>,
}

/// The hub side of a [`MemoryTransport`] link.
pub struct RemoteHub {
    sessions: mpsc::UnboundedReceiver<RemoteEnd>,
}

/// The hub's view of one client session.
pub struct RemoteEnd {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

/// Creates a linked transport/hub pair.
pub fn memory_link() -> (MemoryTransport, RemoteHub) {
    let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
    (
        MemoryTransport {
            sessions: sessions_tx,
        },
        RemoteHub {
            sessions: sessions_rx,
        },
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&mut self, _url: &str) -> Result<TransportPair, RotondeError> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        self.sessions
            .send(RemoteEnd {
                to_client: inbound_tx,
                from_client: outbound_rx,
            })
            .map_err(|_| RotondeError::ConnectFailed("remote hub gone".into()))?;
        Ok(TransportPair {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

impl RemoteHub {
    /// Waits for the next session the client opens.
    pub async fn session(&mut self) -> RemoteEnd {
        within(self.sessions.recv())
            .await
            .expect("client never connected")
    }
}

impl RemoteEnd {
    /// Delivers a packet to the client.
    pub fn send_packet(&self, packet: &Packet) {
        self.to_client
            .send(packet.encode().expect("packet must encode"))
            .expect("client read loop gone");
    }

    /// Delivers a raw text frame to the client.
    pub fn send_frame(&self, frame: &str) {
        self.to_client
            .send(frame.to_string())
            .expect("client read loop gone");
    }

    /// Waits for the next frame the client sends.
    pub async fn next_packet(&mut self) -> Packet {
        let frame = within(self.from_client.recv())
            .await
            .expect("client hung up");
        Packet::decode(&frame).expect("client sent undecodable frame")
    }

    /// Asserts the client has sent nothing further yet.
    pub fn assert_silent(&mut self) {
        assert!(
            self.from_client.try_recv().is_err(),
            "expected no outbound frame"
        );
    }
}
