// FIFO of parked callers waiting on a gating event (credential cache
// loaded, authentication finished, socket connected).
//
// Each waiter holds the receiving half of a oneshot. `drain` takes the
// whole backlog out before delivering, so anything enqueued while a
// drain is running lands in the next cycle instead of being lost.

use tokio::sync::oneshot;

#[derive(Debug)]
pub(crate) struct PendingQueue<T> {
    waiters: Vec<oneshot::Sender<T>>,
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self {
            waiters: Vec::new(),
        }
    }
}

impl<T: Clone> PendingQueue<T> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Park a caller. The receiver resolves on the next `drain`.
    pub(crate) fn enqueue(&mut self) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        rx
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Resolve every parked caller with `outcome`, oldest first.
    ///
    /// Returns how many waiters were still listening.
    pub(crate) fn drain(&mut self, outcome: &T) -> usize {
        let waiters = std::mem::take(&mut self.waiters);
        waiters
            .into_iter()
            .filter_map(|tx| tx.send(outcome.clone()).ok())
            .count()
    }
}
