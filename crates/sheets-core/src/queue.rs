use tokio::sync::watch;

/// Bookkeeping of a sheet's in-flight writes.
///
/// This is a counter, not a lock: writes proceed concurrently and
/// [`WriteQueue::finish_writing`] waits until none are left.
#[derive(Debug)]
pub struct WriteQueue {
    pending: watch::Sender<usize>,
}

impl Default for WriteQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteQueue {
    pub fn new() -> Self {
        let (pending, _) = watch::channel(0);
        Self { pending }
    }

    /// Register a write. It stays pending until the ticket is dropped.
    pub fn begin(&self) -> WriteTicket<'_> {
        self.pending.send_modify(|n| *n += 1);
        WriteTicket { queue: self }
    }

    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Wait until every registered write has finished.
    pub async fn finish_writing(&self) {
        let mut pending = self.pending.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = pending.wait_for(|n| *n == 0).await;
    }
}

/// Marks one write as in flight.
#[must_use = "the write is only pending while the ticket is held"]
pub struct WriteTicket<'a> {
    queue: &'a WriteQueue,
}

impl Drop for WriteTicket<'_> {
    fn drop(&mut self) {
        self.queue
            .pending
            .send_modify(|n| *n = n.saturating_sub(1));
    }
}
