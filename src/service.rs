//! The service trait: lifecycle callbacks a concrete service implements

use anyhow::Result;
use std::ffi::OsString;
use std::sync::Weak;

use crate::controller::ControllerInner;

/// Lifecycle callbacks invoked by the controller in response to control
/// codes from the authority.
///
/// All callbacks run on the authority's dispatch thread, serialized by the
/// authority itself; a long-running body blocks further control delivery for
/// this service until it returns, which is what the pending-state wait hints
/// exist for. Use [`ServiceContext::report_progress`] from inside a slow
/// `on_start`/`on_stop` to keep the authority from declaring the process
/// hung.
pub trait Service: Send {
    /// Executes when the service is started. Returning an error reports the
    /// service as stopped with a non-zero exit code and the process is
    /// expected to exit.
    fn on_start(&mut self, ctx: &ServiceContext, args: &[OsString]) -> Result<()>;

    /// Executes when a Stop control is delivered or [`ServiceController::stop`]
    /// is called. A failure here is logged but never blocks the transition to
    /// stopped.
    ///
    /// [`ServiceController::stop`]: crate::controller::ServiceController::stop
    fn on_stop(&mut self, _ctx: &ServiceContext) -> Result<()> {
        Ok(())
    }

    /// Executes when a Pause control is delivered while running. On failure
    /// the service is reported as still running.
    fn on_pause(&mut self, _ctx: &ServiceContext) -> Result<()> {
        Ok(())
    }

    /// Executes when a Continue control is delivered while paused. On failure
    /// the service is reported as still paused.
    fn on_continue(&mut self, _ctx: &ServiceContext) -> Result<()> {
        Ok(())
    }

    /// Executes when the system is shutting down. No status is reported
    /// afterwards; the process is about to die regardless.
    fn on_shutdown(&mut self, _ctx: &ServiceContext) -> Result<()> {
        Ok(())
    }

    /// Device notification, forwarded verbatim. Delivery presupposes a
    /// device-notification registration owned by the concrete service.
    fn on_device_event(&mut self, _ctx: &ServiceContext, _event_type: u32, _data: &[u8]) {}

    /// Session-change notification, forwarded verbatim. `event_type` carries
    /// the session-change reason code.
    fn on_session_change(&mut self, _ctx: &ServiceContext, _event_type: u32, _session_id: u32) {}
}

/// Handle passed to every callback, giving the service access to the
/// controller it runs under.
#[derive(Clone)]
pub struct ServiceContext {
    inner: Weak<ControllerInner>,
    name: String,
}

impl ServiceContext {
    pub(crate) fn new(inner: Weak<ControllerInner>, name: String) -> Self {
        Self { inner, name }
    }

    /// Name the service is registered under
    pub fn service_name(&self) -> &str {
        &self.name
    }

    /// Re-report the current state with an advanced checkpoint.
    ///
    /// Call this periodically from a slow transition callback so the
    /// authority sees progress and does not declare the process hung.
    pub fn report_progress(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.report_progress();
        }
    }
}
