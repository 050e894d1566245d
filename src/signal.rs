//! Termination signal handling.
//!
//! A single process-wide `ctrlc` hook (SIGINT, plus SIGTERM via the
//! `termination` feature) forwards to whichever [`ShutdownController`] was
//! most recently registered with [`install_handler`]. The hook itself is only
//! installed once; later registrations just retarget it, so several services
//! can be started one after another in the same process (as tests do).

use std::io::Write;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::shutdown::ShutdownController;

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the termination handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

/// How a call to [`install_handler`] took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    /// The process hook was installed by this call.
    Installed,
    /// The hook already existed and now targets the new controller.
    Retargeted,
    /// Another library owns the process hook; signals will not reach the
    /// controller, but manual shutdown requests still work.
    Unhooked,
}

static TARGET: OnceLock<Mutex<Option<Arc<ShutdownController>>>> = OnceLock::new();

fn target() -> &'static Mutex<Option<Arc<ShutdownController>>> {
    TARGET.get_or_init(|| Mutex::new(None))
}

fn on_signal() {
    let _ = writeln!(std::io::stderr(), "\nShutting down, waiting for jobs...");
    let _ = std::io::stderr().flush();

    let controller = target()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    match controller {
        Some(controller) => {
            log::info!("Termination signal received");
            controller.request_shutdown();
        }
        None => log::warn!("Termination signal received with no service registered"),
    }
}

/// Route termination signals to `controller`.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if the operating system refused
/// the hook. A hook already claimed elsewhere is not an error; it yields
/// [`HandlerStatus::Unhooked`].
pub fn install_handler(controller: Arc<ShutdownController>) -> Result<HandlerStatus, SignalError> {
    let mut slot = target().lock().unwrap_or_else(PoisonError::into_inner);
    let already_hooked = slot.is_some();
    *slot = Some(controller);
    drop(slot);

    if already_hooked {
        log::debug!("Signal handler retargeted to new controller");
        return Ok(HandlerStatus::Retargeted);
    }

    match ctrlc::set_handler(on_signal) {
        Ok(()) => {
            log::debug!("Signal handler installed");
            Ok(HandlerStatus::Installed)
        }
        Err(ctrlc::Error::MultipleHandlers) => {
            log::debug!("Termination handler already registered elsewhere, continuing unhooked");
            Ok(HandlerStatus::Unhooked)
        }
        Err(e) => {
            *target().lock().unwrap_or_else(PoisonError::into_inner) = None;
            Err(e.into())
        }
    }
}
