//! Rate-limited dispatch queue for outbound invitations.
//!
//! Submission is decoupled from sending: [`DispatchQueue::enqueue`] appends to
//! an in-memory FIFO and returns at once, while a single background drain loop
//! pulls up to `batch_size` messages per window and sends each batch
//! concurrently. Pending messages and the drain flag share one mutex, so the
//! check-and-set in `enqueue` and the check-and-clear at the end of a drain
//! iteration cannot interleave: at most one drain loop exists per queue.
//!
//! Nothing inside the drain loop reaches the enqueuing caller. Failed sends are
//! logged and dropped, successful ones are handed to the [`Reconciler`].

use std::{collections::VecDeque, sync::Arc, time::Duration};

use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::{runtime::Handle, sync::watch};

use crate::{
    mailer::Mailer,
    message::{delivered_keys, Delivery, DeliveryOutcome, Message},
    reconcile::Reconciler,
};

/// Cheaply clonable handle to a dispatch queue.
#[derive(Clone)]
pub struct DispatchQueue {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    /// Mirror of `State::draining` for waiters. Only written under `state`.
    drain_state: watch::Sender<bool>,

    mailer: Arc<dyn Mailer>,
    reconciler: Reconciler,

    batch_size: usize,
    window: Duration,
    runtime: Handle,
}

#[derive(Default)]
struct State {
    pending: VecDeque<Message>,
    draining: bool,
}

#[bon::bon]
impl DispatchQueue {
    /// Creates an idle queue.
    ///
    /// # Panics
    /// When `runtime` is not given and no tokio runtime is current.
    #[builder]
    pub fn new(
        mailer: Arc<dyn Mailer>,
        reconciler: Reconciler,
        #[builder(default = 10)] batch_size: usize,
        #[builder(default = Duration::from_secs(1))] window: Duration,
        runtime: Option<Handle>,
    ) -> Self {
        let (drain_state, _) = watch::channel(false);

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                drain_state,
                mailer,
                reconciler,
                batch_size: batch_size.max(1),
                window,
                runtime: runtime.unwrap_or_else(Handle::current),
            }),
        }
    }
}

impl DispatchQueue {
    /// Appends a message and starts a drain loop if none is active.
    pub fn enqueue(&self, message: Message) {
        let start = {
            let mut state = self.inner.state.lock();
            state.pending.push_back(message);

            if state.draining {
                false
            } else {
                state.draining = true;
                self.inner.drain_state.send_replace(true);
                true
            }
        };

        if start {
            let inner = Arc::clone(&self.inner);
            self.inner.runtime.spawn(inner.drain());
        }
    }

    /// Number of messages not yet pulled into a batch.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    pub fn is_draining(&self) -> bool {
        self.inner.state.lock().draining
    }

    pub fn batch_size(&self) -> usize {
        self.inner.batch_size
    }

    pub fn window(&self) -> Duration {
        self.inner.window
    }

    /// Runtime the drain loop is spawned on.
    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    /// Resolves once no drain loop is active.
    pub async fn idle(&self) {
        let mut rx = self.inner.drain_state.subscribe();
        let _ = rx.wait_for(|draining| !*draining).await;
    }
}

impl Inner {
    fn next_batch(&self) -> Vec<Message> {
        let mut state = self.state.lock();
        let take = self.batch_size.min(state.pending.len());
        state.pending.drain(..take).collect()
    }

    /// Clears the drain flag if nothing arrived meanwhile.
    ///
    /// # Returns
    /// `true` when the loop should terminate.
    fn finish_if_empty(&self) -> bool {
        let mut state = self.state.lock();
        if !state.pending.is_empty() {
            return false;
        }

        state.draining = false;
        self.drain_state.send_replace(false);
        true
    }

    fn abort(&self) {
        let mut state = self.state.lock();
        state.draining = false;
        self.drain_state.send_replace(false);
    }

    async fn drain(self: Arc<Self>) {
        let mut guard = DrainGuard {
            inner: &*self,
            finished: false,
        };

        tracing::debug!(
            batch_size = self.batch_size,
            window_ms = self.window.as_millis() as u64,
            "Drain loop started"
        );

        loop {
            let batch = self.next_batch();
            if !batch.is_empty() {
                self.send_batch(batch).await;
            }

            if self.finish_if_empty() {
                break;
            }

            tokio::time::sleep(self.window).await;
        }

        guard.finished = true;
        tracing::debug!("Drain loop finished, queue is empty");
    }

    async fn send_batch(&self, batch: Vec<Message>) {
        let size = batch.len();

        let deliveries = join_all(batch.iter().map(|message| self.deliver(message))).await;

        let failed = deliveries
            .iter()
            .filter(|d| d.outcome == DeliveryOutcome::Failed)
            .count();
        let delivered = delivered_keys(deliveries);

        tracing::info!(size, failed, "Batch dispatched");

        self.reconciler.reconcile(&delivered).await;
    }

    async fn deliver(&self, message: &Message) -> Delivery {
        let outcome = match self.mailer.send(message).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(e) => {
                tracing::warn!(
                    recipient = %message.recipient,
                    correlation = ?message.correlation,
                    "Failed to deliver message: {e:#}"
                );
                DeliveryOutcome::Failed
            }
        };

        tracing::trace!(recipient = %message.recipient, %outcome, "Delivery outcome");

        Delivery {
            correlation: message.correlation.clone(),
            outcome,
        }
    }
}

/// Releases the drain flag if the loop unwinds, so the next `enqueue` can
/// start a fresh loop.
struct DrainGuard<'a> {
    inner: &'a Inner,
    finished: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::error!("Drain loop aborted, pending messages wait for the next enqueue");
            self.inner.abort();
        }
    }
}
