//! Admission control for batch mode.
//!
//! The gate counts free execution slots. The dispatch loop reserves a slot the moment it decides
//! to launch a unit, and every unit hands back a `CompletionGuard` signal when it finishes,
//! whether it succeeded, failed, or panicked. Signals are consumed by the loop itself, either while
//! it waits for capacity or in the final barrier.

/// Message sent from an execution unit to the dispatch loop when it finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Host the unit ran against.
    pub host: String,
    /// Whether the unit produced a success report.
    pub success: bool,
}

/// Counting admission control bounding how many units run at once.
///
/// `available` starts at the configured thread count, so the first `threads` launches never
/// block and the next one waits for a completion.
#[derive(Debug)]
pub struct ConcurrencyGate {
    /// Configured concurrency.
    capacity: usize,
    /// Free slots. Only goes to zero or below between a reservation and its release.
    available: isize,
    /// Units reserved but not yet released.
    outstanding: usize,
    /// Completions released so far, in the order they were observed.
    completed: Vec<Completion>,
    completion_tx: flume::Sender<Completion>,
    completion_rx: flume::Receiver<Completion>,
}

impl ConcurrencyGate {
    /// Creates a gate with `threads` slots. Zero is treated as one.
    pub fn new(threads: usize) -> Self {
        let capacity = threads.max(1);
        let (completion_tx, completion_rx) = flume::unbounded();
        Self {
            capacity,
            available: capacity as isize,
            outstanding: 0,
            completed: Vec::new(),
            completion_tx,
            completion_rx,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> isize {
        self.available
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Takes a slot for `host` unconditionally and returns the guard the unit must carry.
    ///
    /// Dropping the guard is the unit's completion signal.
    pub fn reserve(&mut self, host: &str) -> CompletionGuard {
        self.available -= 1;
        self.outstanding += 1;
        CompletionGuard {
            host: host.to_string(),
            success: false,
            completion_tx: self.completion_tx.clone(),
        }
    }

    /// Returns a slot for a finished unit.
    pub fn release(&mut self, completion: Completion) {
        self.available += 1;
        self.outstanding = self.outstanding.saturating_sub(1);
        tracing::debug!(
            host = %completion.host,
            success = completion.success,
            available = self.available,
            "Unit completed"
        );
        self.completed.push(completion);
    }

    /// Releases every completion that has already been signalled, without blocking.
    pub fn settle(&mut self) {
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.release(completion);
        }
    }

    /// Blocks while no slot is free, consuming one completion per wait.
    pub async fn await_capacity(&mut self) {
        self.settle();
        while self.available <= 0 && self.outstanding > 0 {
            // The gate owns a sender, so the channel never disconnects.
            match self.completion_rx.recv_async().await {
                Ok(completion) => self.release(completion),
                Err(_) => break,
            }
        }
    }

    /// Blocks until every reserved unit has signalled completion, then returns all completions
    /// seen during this gate's lifetime.
    pub async fn wait_all(&mut self) -> Vec<Completion> {
        self.settle();
        while self.outstanding > 0 {
            match self.completion_rx.recv_async().await {
                Ok(completion) => self.release(completion),
                Err(_) => break,
            }
        }
        std::mem::take(&mut self.completed)
    }
}

/// Completion signal carried by a running unit. Fires exactly once, on drop.
///
/// Because it fires on drop it also fires while a panicking unit unwinds.
#[derive(Debug)]
pub struct CompletionGuard {
    host: String,
    success: bool,
    completion_tx: flume::Sender<Completion>,
}

impl CompletionGuard {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Records the outcome reported on drop. Defaults to failure.
    pub fn set_success(&mut self, success: bool) {
        self.success = success;
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let _ = self.completion_tx.send(Completion {
            host: std::mem::take(&mut self.host),
            success: self.success,
        });
    }
}
