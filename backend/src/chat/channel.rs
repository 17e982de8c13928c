//! Duplex Channel
//!
//! Owns the single live connection to the conversational backend. Outbound
//! text is queued onto a writer task; inbound text frames are pushed onto an
//! unbounded queue that the [`Bridge`](super::Bridge) listener drains.
//!
//! The channel doubles as the process heartbeat: closing it (explicitly, or
//! because the backend went away) flips a shutdown signal the HTTP server
//! waits on.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Errors raised by the duplex channel
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Could not establish the backend connection
    #[error("Failed to connect to backend at {url}: {reason}")]
    Connect {
        /// Backend URL
        url: String,
        /// Underlying failure
        reason: String,
    },

    /// The connection is closed
    #[error("Channel closed")]
    Closed,
}

/// Frame queued for the writer side of the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFrame {
    /// Text message
    Text(String),
    /// Request an orderly close of the connection
    Close,
}

/// Inbound text frames, drained by exactly one listener
pub type Inbound = mpsc::UnboundedReceiver<String>;

/// Backend side of an in-memory channel
pub struct Peer {
    /// Frames the gateway sent
    pub incoming: mpsc::UnboundedReceiver<ChannelFrame>,
    /// Replies to deliver back to the gateway; dropping it closes the channel
    pub outgoing: mpsc::UnboundedSender<String>,
}

/// Handle to the one duplex connection of this process
pub struct DuplexChannel {
    outbound: mpsc::UnboundedSender<ChannelFrame>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl DuplexChannel {
    fn with_outbound(outbound: mpsc::UnboundedSender<ChannelFrame>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            outbound,
            closed: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Connect to the backend WebSocket
    ///
    /// # Arguments
    /// * `url` - WebSocket URL of the world server
    ///
    /// # Returns
    /// * `Ok((DuplexChannel, Inbound))` - channel handle and inbound frame queue
    /// * `Err(ChannelError)` - connection failed
    pub async fn connect(url: &str) -> Result<(Self, Inbound), ChannelError> {
        let (ws_stream, _) =
            tokio_tungstenite::connect_async(url)
                .await
                .map_err(|e| ChannelError::Connect {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        info!(url = %url, "Connected to conversational backend");

        let (mut sink, mut stream) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ChannelFrame>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        // Outbound queue → socket
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    ChannelFrame::Text(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            error!(error = %e, "Failed to write to backend socket");
                            break;
                        }
                    }
                    ChannelFrame::Close => {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
            debug!("Backend writer task finished");
        });

        // Socket → inbound queue
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("Backend closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "Backend socket error");
                        break;
                    }
                }
            }
            // Dropping inbound_tx ends the listener's stream.
            debug!("Backend reader task finished");
        });

        Ok((Self::with_outbound(outbound_tx), inbound_rx))
    }

    /// Build an in-memory channel
    ///
    /// # Returns
    /// * `(DuplexChannel, Inbound, Peer)` - gateway handle, inbound queue, backend end
    pub fn pair() -> (Self, Inbound, Peer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let peer = Peer {
            incoming: outbound_rx,
            outgoing: inbound_tx,
        };
        (Self::with_outbound(outbound_tx), inbound_rx, peer)
    }

    /// Enqueue an outbound text frame
    pub fn send(&self, text: String) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        self.outbound
            .send(ChannelFrame::Text(text))
            .map_err(|_| ChannelError::Closed)
    }

    /// Close the connection and signal process shutdown
    ///
    /// Idempotent; only the first call has an effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Closing backend channel");
        if self.outbound.send(ChannelFrame::Close).is_err() {
            warn!("Backend writer already gone");
        }
        self.shutdown.send_replace(true);
    }

    /// Whether the channel has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Subscribe to the shutdown signal
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Resolve once the channel has been closed
    pub async fn closed(&self) {
        let mut rx = self.shutdown.subscribe();
        // wait_for checks the current value first; the sender lives in self.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}
