//! Narrow interfaces to the external control authority
//!
//! The authority (the Windows Service Control Manager, the console fallback,
//! or a scripted stand-in under test) owns process lifecycle: it invokes the
//! service entry point exactly once, delivers control codes serialized on its
//! own dispatch thread, and accepts status reports through the handle issued
//! at registration.

use anyhow::Result;

use crate::status::StatusReport;

/// A control code delivered by the authority after registration.
///
/// `event_type` and the payload are populated only for device and session
/// notifications and are forwarded verbatim to the service callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    Stop,
    Pause,
    Continue,
    Shutdown,
    /// Liveness probe; handled without touching the state machine
    Interrogate,
    DeviceEvent {
        event_type: u32,
        data: Vec<u8>,
    },
    SessionChange {
        event_type: u32,
        session_id: u32,
    },
    /// A code this shell does not dispatch
    Other(u32),
}

/// Outcome of handling one control request, mirrored back to the authority's
/// own handler-result semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Handled,
    /// Left to the authority's default handling
    NotImplemented,
}

/// Control-handler callback registered with the authority. Invoked on the
/// authority's dispatch thread for every delivered control code.
pub type ControlHandler = Box<dyn Fn(ControlRequest) -> HandlerOutcome + Send + Sync>;

/// Opaque status handle issued by [`ControlAuthority::register_handler`].
///
/// Invalid before registration succeeds; the controller publishes every
/// status mutation through it. A failed report is logged by the caller and
/// treated as non-fatal.
pub trait StatusSink: Send {
    fn report(&self, report: &StatusReport) -> Result<()>;
}

/// The external control authority.
pub trait ControlAuthority: Send + Sync {
    /// Hand the calling thread to the authority's dispatch loop.
    ///
    /// Blocks until the service has fully stopped. The authority invokes the
    /// process-wide entry point [`crate::controller::service_main`] exactly
    /// once with the startup arguments. An error means registration with the
    /// authority itself failed (e.g. the process was not launched as a
    /// managed service).
    fn run_dispatcher(&self, name: &str) -> Result<()>;

    /// Register the control handler for the named service, obtaining the
    /// status handle used for all subsequent reports.
    fn register_handler(&self, name: &str, handler: ControlHandler) -> Result<Box<dyn StatusSink>>;
}
