//! Bridge
//!
//! Turns the duplex channel's asynchronous inbound stream into an ordered
//! sequence of synchronous request/response exchanges.
//!
//! Concurrency model:
//! - A fair (FIFO) admission mutex lets exactly one exchange be in flight.
//!   This is the throughput limit of the whole gateway: the protocol carries
//!   no correlation id, so replies can only be matched by order.
//! - One background listener owns the inbound stream. For every reply it
//!   takes the pending slot and fires its one-shot sender.
//! - Once admitted, an exchange runs on its own task holding the admission
//!   guard. A caller that goes away cannot free the slot before its reply is
//!   consumed; the reply is simply discarded.
//! - A recovering exchange keeps the admission guard past a timeout: it sends
//!   a recovery utterance and drains inbound replies until one of the expected
//!   acknowledgements arrives, so a late reply never reaches the next caller.

use crate::chat::channel::{DuplexChannel, Inbound};
use crate::chat::protocol::{ReplyFrame, Utterance, SESSION_ENDED};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Errors returned by [`Bridge::exchange`]
#[derive(Error, Debug)]
pub enum BridgeError {
    /// No reply within the configured bound
    #[error("No reply from backend within {0:?}")]
    Timeout(Duration),

    /// The backend connection is gone
    #[error("Backend channel closed")]
    ChannelClosed,

    /// Outbound utterance could not be serialized
    #[error("Failed to encode utterance: {0}")]
    Encode(#[from] serde_json::Error),

    /// The exchange task panicked or was cancelled by the runtime
    #[error("Exchange aborted: {0}")]
    Aborted(String),
}

/// Where the listener delivers replies for the pending exchange
enum ReplyWaiter {
    /// Exactly one reply, then the slot is freed
    Once(oneshot::Sender<String>),
    /// Every reply until the owner takes the slot back
    Drain(mpsc::UnboundedSender<String>),
}

/// The single in-flight correlation record
struct PendingExchange {
    /// Outbound frame this exchange is waiting on
    outbound: String,
    reply: ReplyWaiter,
}

/// Outcome of handing one inbound reply to the slot
enum Delivery {
    Delivered,
    /// The waiter went away before the reply arrived
    Abandoned,
    Unsolicited,
}

/// Holder of the (at most one) pending exchange
#[derive(Default)]
struct ReplySlot {
    pending: std::sync::Mutex<Option<PendingExchange>>,
}

impl ReplySlot {
    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PendingExchange>> {
        // A panic while holding this lock cannot leave the Option half-written.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install a new pending exchange, returning any stale one
    fn install(&self, pending: PendingExchange) -> Option<PendingExchange> {
        self.lock().replace(pending)
    }

    fn take(&self) -> Option<PendingExchange> {
        self.lock().take()
    }

    /// Hand `reply` to the pending exchange; a draining waiter stays installed
    fn deliver(&self, reply: String) -> Delivery {
        let mut slot = self.lock();
        let delivered = match slot.take() {
            Some(PendingExchange {
                outbound,
                reply: ReplyWaiter::Drain(tx),
            }) => {
                let delivered = tx.send(reply).is_ok();
                *slot = Some(PendingExchange {
                    outbound,
                    reply: ReplyWaiter::Drain(tx),
                });
                delivered
            }
            Some(PendingExchange {
                reply: ReplyWaiter::Once(tx),
                ..
            }) => tx.send(reply).is_ok(),
            None => return Delivery::Unsolicited,
        };
        if delivered {
            Delivery::Delivered
        } else {
            Delivery::Abandoned
        }
    }
}

/// Frame sent after a timeout to bring the backend back in step
struct Recovery {
    outbound: String,
    acks: Vec<String>,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    completed: AtomicU64,
    timed_out: AtomicU64,
    discarded: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Snapshot of bridge instrumentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    /// Outbound frames sent
    pub sent: u64,
    /// Exchanges that received a reply
    pub completed: u64,
    /// Exchanges that hit the timeout
    pub timed_out: u64,
    /// Late replies drained during recovery
    pub discarded: u64,
    /// Exchanges currently awaiting a reply
    pub in_flight: usize,
    /// Highest `in_flight` ever observed; never above 1
    pub max_in_flight: usize,
}

/// Marks one exchange as in flight for as long as it lives
struct InFlight<'a>(&'a Counters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

struct BridgeInner {
    channel: Arc<DuplexChannel>,
    slot: ReplySlot,
    timeout: Duration,
    counters: Counters,
}

/// Serializes request/response exchanges over the single duplex channel
pub struct Bridge {
    inner: Arc<BridgeInner>,
    admission: Arc<Mutex<()>>,
}

impl Bridge {
    /// Create the bridge and spawn its inbound listener
    ///
    /// # Arguments
    /// * `channel` - The process-wide duplex channel
    /// * `inbound` - Inbound frame queue of that channel
    /// * `timeout` - Bound on waiting for a single reply
    pub fn new(channel: Arc<DuplexChannel>, inbound: Inbound, timeout: Duration) -> Self {
        let inner = Arc::new(BridgeInner {
            channel,
            slot: ReplySlot::default(),
            timeout,
            counters: Counters::default(),
        });
        tokio::spawn(listen(inbound, inner.clone()));
        Self {
            inner,
            admission: Arc::new(Mutex::new(())),
        }
    }

    /// Send one utterance and wait for its reply
    ///
    /// Callers queue in admission order; only one exchange is outstanding at
    /// any instant.
    ///
    /// # Returns
    /// * `Ok(String)` - Reply text
    /// * `Err(BridgeError::Timeout)` - No reply within the bound; slot released
    /// * `Err(BridgeError::ChannelClosed)` - Backend connection lost
    pub async fn exchange(&self, utterance: &Utterance) -> Result<String, BridgeError> {
        let outbound = serde_json::to_string(utterance)?;
        let guard = self.admission.clone().lock_owned().await;
        let inner = self.inner.clone();
        tokio::spawn(run_exchange(guard, inner, outbound, None))
            .await
            .map_err(|e| BridgeError::Aborted(e.to_string()))?
    }

    /// Like [`Bridge::exchange`], but a timeout is followed by a recovery
    /// round trip under the same admission
    ///
    /// After the timeout, `recovery` is sent and inbound replies are discarded
    /// until one equal to an entry of `acks` arrives or another timeout bound
    /// passes. Only then is the next caller admitted.
    ///
    /// # Returns
    /// * `Err(BridgeError::Timeout)` - Once recovery has finished
    pub async fn exchange_or_recover(
        &self,
        utterance: &Utterance,
        recovery: &Utterance,
        acks: &[&str],
    ) -> Result<String, BridgeError> {
        let outbound = serde_json::to_string(utterance)?;
        let recovery = Recovery {
            outbound: serde_json::to_string(recovery)?,
            acks: acks.iter().map(|ack| ack.to_string()).collect(),
        };
        let guard = self.admission.clone().lock_owned().await;
        let inner = self.inner.clone();
        tokio::spawn(run_exchange(guard, inner, outbound, Some(recovery)))
            .await
            .map_err(|e| BridgeError::Aborted(e.to_string()))?
    }

    /// Current instrumentation counters
    pub fn stats(&self) -> BridgeStats {
        let c = &self.inner.counters;
        BridgeStats {
            sent: c.sent.load(Ordering::SeqCst),
            completed: c.completed.load(Ordering::SeqCst),
            timed_out: c.timed_out.load(Ordering::SeqCst),
            discarded: c.discarded.load(Ordering::SeqCst),
            in_flight: c.in_flight.load(Ordering::SeqCst),
            max_in_flight: c.max_in_flight.load(Ordering::SeqCst),
        }
    }

    /// The channel this bridge drives
    pub fn channel(&self) -> &Arc<DuplexChannel> {
        &self.inner.channel
    }
}

async fn run_exchange(
    _admission: OwnedMutexGuard<()>,
    inner: Arc<BridgeInner>,
    outbound: String,
    recovery: Option<Recovery>,
) -> Result<String, BridgeError> {
    if inner.channel.is_closed() {
        return Err(BridgeError::ChannelClosed);
    }

    let (reply_tx, reply_rx) = oneshot::channel();
    let stale = inner.slot.install(PendingExchange {
        outbound: outbound.clone(),
        reply: ReplyWaiter::Once(reply_tx),
    });
    if let Some(stale) = stale {
        debug!(
            outbound_len = stale.outbound.len(),
            "Cleared stale pending exchange"
        );
    }

    let in_flight = InFlight::enter(&inner.counters);
    if inner.channel.send(outbound).is_err() {
        inner.slot.take();
        return Err(BridgeError::ChannelClosed);
    }
    inner.counters.sent.fetch_add(1, Ordering::SeqCst);

    let outcome = tokio::time::timeout(inner.timeout, reply_rx).await;
    drop(in_flight);
    match outcome {
        Ok(Ok(reply)) => {
            inner.counters.completed.fetch_add(1, Ordering::SeqCst);
            end_session_on(&inner, &reply);
            Ok(reply)
        }
        // Listener dropped the sender: inbound stream ended.
        Ok(Err(_)) => Err(BridgeError::ChannelClosed),
        Err(_) => {
            inner.slot.take();
            inner.counters.timed_out.fetch_add(1, Ordering::SeqCst);
            warn!(timeout = ?inner.timeout, "Bridge exchange timed out");
            if let Some(recovery) = recovery {
                recover(&inner, recovery).await;
            }
            Err(BridgeError::Timeout(inner.timeout))
        }
    }
}

fn end_session_on(inner: &BridgeInner, reply: &str) {
    if reply == SESSION_ENDED {
        info!("Backend ended the session, shutting down channel");
        inner.channel.close();
    }
}

/// Send the recovery frame and drain replies until it is acknowledged.
/// Runs while the caller still holds admission.
async fn recover(inner: &BridgeInner, recovery: Recovery) {
    if inner.channel.is_closed() {
        return;
    }

    let (drain_tx, mut drain_rx) = mpsc::unbounded_channel();
    inner.slot.install(PendingExchange {
        outbound: recovery.outbound.clone(),
        reply: ReplyWaiter::Drain(drain_tx),
    });
    let _in_flight = InFlight::enter(&inner.counters);
    if inner.channel.send(recovery.outbound).is_err() {
        inner.slot.take();
        return;
    }
    inner.counters.sent.fetch_add(1, Ordering::SeqCst);

    let deadline = Instant::now() + inner.timeout;
    loop {
        match tokio::time::timeout_at(deadline, drain_rx.recv()).await {
            Ok(Some(reply)) if recovery.acks.contains(&reply) => {
                inner.counters.completed.fetch_add(1, Ordering::SeqCst);
                info!("Backend acknowledged recovery");
                break;
            }
            Ok(Some(reply)) => {
                inner.counters.discarded.fetch_add(1, Ordering::SeqCst);
                debug!(reply_len = reply.len(), "Discarding late reply");
                if reply == SESSION_ENDED {
                    end_session_on(inner, &reply);
                    break;
                }
            }
            // Inbound stream ended.
            Ok(None) => break,
            Err(_) => {
                warn!(timeout = ?inner.timeout, "Backend did not acknowledge recovery");
                break;
            }
        }
    }
    inner.slot.take();
}

async fn listen(mut inbound: Inbound, inner: Arc<BridgeInner>) {
    while let Some(raw) = inbound.recv().await {
        let reply = match serde_json::from_str::<ReplyFrame>(&raw) {
            Ok(frame) => frame.text,
            Err(e) => {
                warn!(error = %e, frame_len = raw.len(), "Dropping undecodable reply frame");
                continue;
            }
        };

        let reply_len = reply.len();
        match inner.slot.deliver(reply) {
            Delivery::Delivered => {}
            Delivery::Abandoned => debug!("Exchange gave up before its reply arrived"),
            Delivery::Unsolicited => {
                warn!(reply_len, "Dropping reply with no pending exchange")
            }
        }
    }

    warn!("Backend inbound stream ended");
    // Close before failing the slot so a racing exchange cannot send afterwards.
    inner.channel.close();
    inner.slot.take();
}
