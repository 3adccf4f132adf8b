//! Cooperative cancellation.
//!
//! Long-running operations (indexing, batch execution) check a shared
//! [`KeepGoing`] signal between files and between batches. Cancelling is
//! always clean: anything already fingerprinted, backed up or logged stays
//! valid, the operation just stops picking up new work.
//!
//! ```rust,no_run
//! use safedupe::signal::install_handler;
//!
//! let keep_going = install_handler().expect("Failed to install signal handler");
//! while keep_going.should_continue() {
//!     // process the next file
//!     # break;
//! }
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit code for SIGINT (Ctrl+C) interruption (128 + SIGINT).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared "keep going" signal.
///
/// Cloning shares the underlying flag, so a clone handed to the indexer
/// observes a cancellation requested through the original.
#[derive(Debug, Clone, Default)]
pub struct KeepGoing {
    cancelled: Arc<AtomicBool>,
}

impl KeepGoing {
    /// Create a signal that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` until [`cancel`](Self::cancel) is called or Ctrl+C arrives.
    #[must_use]
    pub fn should_continue(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
    }

    /// `true` once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Request that in-flight work stops at the next checkpoint.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clear a previous cancellation.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_SIGNAL: OnceLock<KeepGoing> = OnceLock::new();

/// Install a Ctrl+C handler that cancels the process-wide [`KeepGoing`].
///
/// Calling this more than once returns the already-installed signal (reset
/// to "keep going"), which lets tests call into `run_app` repeatedly.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if the platform refuses the hook
/// and no signal was installed earlier in this process.
pub fn install_handler() -> Result<KeepGoing, SignalError> {
    if let Some(existing) = GLOBAL_SIGNAL.get() {
        existing.reset();
        return Ok(existing.clone());
    }

    let signal = KeepGoing::new();
    let hooked = signal.clone();

    match ctrlc::set_handler(move || {
        hooked.cancel();
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing current file...");
        let _ = std::io::stderr().flush();
        log::info!("Cancellation requested by signal");
    }) {
        Ok(()) => {
            let _ = GLOBAL_SIGNAL.set(signal.clone());
            Ok(signal)
        }
        Err(ctrlc::Error::MultipleHandlers) => {
            log::debug!("Ctrl+C handler already registered, using unhooked signal");
            let _ = GLOBAL_SIGNAL.set(signal.clone());
            Ok(GLOBAL_SIGNAL.get().cloned().unwrap_or(signal))
        }
        Err(e) => Err(SignalError::InstallFailed(e)),
    }
}
