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

//! The transport collaborator seam.
//!
//! The physical channel is external to the protocol layer: it opens against
//! a URL, fires an open transition once (a successful [`Transport::open`]),
//! delivers each received text frame, and accepts text frames to send. The
//! client never sees bytes, sockets, or framing.
//!
//! [`TcpTransport`] is the provided implementation: newline-delimited text
//! frames over a `TcpStream`, the read and write halves each bridged to the
//! channel pair by a spawned task. Mid-session loss simply closes the pair;
//! reconnection is the caller's decision, made by calling `connect` again.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use rotonde_core::prelude::RotondeError;

/// The duplex halves handed to the client when a channel opens.
///
/// Dropping either half is how the transport observes the client going
/// away, and vice versa.
#[derive(Debug)]
pub struct TransportPair {
    /// Text frames the client sends toward the remote side.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Text frames received from the remote side.
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// A collaborator able to open a duplex, message-oriented text channel.
///
/// Implementations own all physical concerns (sockets, framing, TLS). The
/// client calls [`open`](Transport::open) once per `connect`, including
/// reconnects; each call must produce a fresh pair.
#[async_trait]
pub trait Transport: Send {
    /// Opens the channel against `url`.
    ///
    /// Returning `Ok` is the open-transition notification.
    async fn open(&mut self, url: &str) -> Result<TransportPair, RotondeError>;
}

/// TCP transport with one newline-delimited JSON packet per frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self, url: &str) -> Result<TransportPair, RotondeError> {
        let stream = TcpStream::connect(url)
            .await
            .map_err(|e| RotondeError::ConnectFailed(e.to_string()))?;
        trace!(url, "transport connected");
        let (read_half, mut write_half) = stream.into_split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(error) = write_half.write_all(frame.as_bytes()).await {
                    warn!(%error, "transport write failed");
                    break;
                }
                if let Err(error) = write_half.write_all(b"\n").await {
                    warn!(%error, "transport write failed");
                    break;
                }
            }
            trace!("transport writer ended");
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if inbound_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(error) => {
                        warn!(%error, "transport read failed");
                        break;
                    }
                }
            }
            trace!("transport reader ended");
        });

        Ok(TransportPair {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
