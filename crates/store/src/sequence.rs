//! Local patch ordering.

use std::sync::atomic::{AtomicU64, Ordering};

/// Position of a patch in local issue order. `0` means "never written".
pub type Sequence = u64;

/// Monotonically increasing sequence shared by every source.
///
/// Stream events draw a sequence when they are received. Polls draw one when
/// the request is *issued*, so a slow response cannot overwrite fields that a
/// fresher source wrote while the request was in flight.
#[derive(Debug, Default)]
pub struct SequenceClock {
    last: AtomicU64,
}

impl SequenceClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw the next sequence (starts at 1).
    pub fn tick(&self) -> Sequence {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Last sequence handed out.
    pub fn current(&self) -> Sequence {
        self.last.load(Ordering::SeqCst)
    }
}
