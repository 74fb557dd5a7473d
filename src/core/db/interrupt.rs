/// Interrupt/Cancellation Channel
///
/// An [`InterruptSignal`] is a latch shared between the thread stepping a
/// statement and any number of threads that may want to cancel it. The
/// connection polls it at every `step` entry and from the engine's progress
/// handler, so a triggered signal is observed at the next checkpoint.
use std::os::raw::{c_int, c_void};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub(crate) struct InterruptState {
    triggered: AtomicBool,
    deadline: Option<Instant>,
}

impl InterruptState {
    fn is_triggered(&self) -> bool {
        if self.triggered.load(Ordering::Acquire) {
            return true;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.triggered.store(true, Ordering::Release);
                true
            }
            _ => false,
        }
    }
}

/// Cancellation latch for long-running engine calls.
///
/// Cloning yields another handle to the same latch. Signals are `Send` and
/// `Sync` so they can be triggered from any thread, unlike the connection
/// they are installed on.
#[derive(Debug, Clone)]
pub struct InterruptSignal {
    state: Arc<InterruptState>,
}

impl InterruptSignal {
    pub fn new() -> Self {
        InterruptSignal {
            state: Arc::new(InterruptState {
                triggered: AtomicBool::new(false),
                deadline: None,
            }),
        }
    }

    /// A signal that triggers itself once `deadline` has passed.
    pub fn with_deadline(deadline: Instant) -> Self {
        InterruptSignal {
            state: Arc::new(InterruptState {
                triggered: AtomicBool::new(false),
                deadline: Some(deadline),
            }),
        }
    }

    /// A signal that triggers itself after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn trigger(&self) {
        self.state.triggered.store(true, Ordering::Release);
    }

    /// Re-arms the latch. An expired deadline keeps the signal triggered.
    pub fn clear(&self) {
        self.state.triggered.store(false, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.state.is_triggered()
    }

    /// Whether both handles refer to the same latch.
    pub fn same_as(&self, other: &InterruptSignal) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Pointer handed to the progress handler; valid while `self` is alive.
    pub(crate) fn as_handler_arg(&self) -> *mut c_void {
        Arc::as_ptr(&self.state) as *mut c_void
    }
}

impl Default for InterruptSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress handler polled by the engine; a non-zero return aborts the
/// running operation with `SQLITE_INTERRUPT`.
pub(crate) unsafe extern "C" fn progress_checkpoint(arg: *mut c_void) -> c_int {
    if arg.is_null() {
        return 0;
    }
    let state = &*(arg as *const InterruptState);
    state.is_triggered() as c_int
}
