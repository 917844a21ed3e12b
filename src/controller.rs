//! The service controller: lifecycle state machine and control dispatch

use anyhow::{anyhow, Result};
use log::{debug, error, info};
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::authority::{ControlAuthority, ControlHandler, ControlRequest, HandlerOutcome, StatusSink};
use crate::config::ServiceConfig;
use crate::service::{Service, ServiceContext};
use crate::status::{ServiceState, StatusRecord, StatusReport};

/// Exit code reported when a callback fails without a more specific one.
/// Anything non-zero reads as "failed"; nothing keys off this constant.
const ERROR_EXIT_CODE: u32 = 1;

/// The controller the dispatch path resolves to. The legacy entry point has
/// no per-call context slot, so exactly one controller may be active per
/// process; the slot is bound when `run` begins and cleared when it returns.
static ACTIVE: Mutex<Option<Arc<ControllerInner>>> = Mutex::new(None);

/// Entry point invoked by the authority's dispatch loop, exactly once per
/// run, carrying the startup arguments.
///
/// Authority backends call this from wherever their dispatch mechanism lands
/// (the generated FFI entry on Windows, the fallback loop on the console).
pub fn service_main(arguments: Vec<OsString>) {
    let inner = lock(&ACTIVE).clone();
    match inner {
        Some(inner) => inner.on_service_main(arguments),
        None => error!("service entry point invoked with no active controller"),
    }
}

// A panicking callback must not wedge the stop path or the status choke
// point.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Stateful shell around a [`Service`] implementation.
///
/// Registers the service with the control authority, dispatches delivered
/// control codes to the lifecycle callbacks, and publishes every status
/// transition. Cloning is shallow; hand a clone to a signal handler or
/// watchdog that needs [`stop`](Self::stop).
#[derive(Clone)]
pub struct ServiceController {
    inner: Arc<ControllerInner>,
}

impl ServiceController {
    pub fn new(
        config: ServiceConfig,
        service: impl Service + 'static,
        authority: impl ControlAuthority + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                config,
                authority: Box::new(authority),
                service: Mutex::new(Box::new(service)),
                status: Mutex::new(StatusRecord::new()),
                sink: Mutex::new(None),
                stop_initiated: Mutex::new(false),
                fatal: Mutex::new(None),
            }),
        }
    }

    /// Name the service is registered under
    pub fn service_name(&self) -> &str {
        &self.inner.config.name
    }

    /// Hand the calling thread to the control authority and block until the
    /// service has fully stopped.
    ///
    /// Returns an error when registration with the authority fails (e.g. the
    /// process was not launched as a managed service) or when `on_start`
    /// reported failure. Either way the error has already been logged.
    pub fn run(&self) -> Result<()> {
        {
            let mut active = lock(&ACTIVE);
            if active.is_some() {
                return Err(anyhow!(
                    "another service controller is already active in this process"
                ));
            }
            *active = Some(Arc::clone(&self.inner));
        }

        let dispatched = self.inner.authority.run_dispatcher(&self.inner.config.name);
        *lock(&ACTIVE) = None;

        if let Err(e) = &dispatched {
            self.inner.write_error_log_entry("run_dispatcher", e);
        }
        dispatched?;

        match lock(&self.inner.fatal).take() {
            Some(fatal) => Err(fatal),
            None => Ok(()),
        }
    }

    /// Request the stop transition from outside the authority's signal path
    /// (a supervisor, a signal handler, a fatal internal condition).
    ///
    /// Safe to call from any thread, and idempotent: a stop that is already
    /// in progress or finished makes this a no-op.
    pub fn stop(&self) {
        self.inner.request_stop();
    }
}

pub(crate) struct ControllerInner {
    config: ServiceConfig,
    authority: Box<dyn ControlAuthority>,
    service: Mutex<Box<dyn Service>>,
    status: Mutex<StatusRecord>,
    sink: Mutex<Option<Box<dyn StatusSink>>>,
    stop_initiated: Mutex<bool>,
    fatal: Mutex<Option<anyhow::Error>>,
}

impl ControllerInner {
    /// Entry-point notification: register the control handler, then drive
    /// the start transition.
    fn on_service_main(self: &Arc<Self>, arguments: Vec<OsString>) {
        self.write_event_log_entry("service entry point invoked");

        let handler_inner = Arc::clone(self);
        let handler: ControlHandler =
            Box::new(move |request| handler_inner.on_control_request(request));
        let sink = match self.authority.register_handler(&self.config.name, handler) {
            Ok(sink) => sink,
            Err(e) => {
                self.write_error_log_entry("register_handler", &e);
                self.set_fatal(e);
                return;
            }
        };
        *lock(&self.sink) = Some(sink);

        self.set_service_status(ServiceState::StartPending, 0, self.config.pending_wait_hint());

        let ctx = self.context();
        let started = lock(&self.service).on_start(&ctx, &arguments);
        match started {
            Ok(()) => {
                // An external stop may have won the race while on_start was
                // still executing; the report stream must stay monotonic.
                let initiated = lock(&self.stop_initiated);
                if !*initiated {
                    self.set_service_status(ServiceState::Running, 0, Duration::ZERO);
                    self.write_event_log_entry("service started");
                }
            }
            Err(e) => {
                self.write_error_log_entry("on_start", &e);
                self.set_service_status(ServiceState::Stopped, ERROR_EXIT_CODE, Duration::ZERO);
                self.set_fatal(e);
            }
        }
    }

    /// Control dispatch. Delivered serialized on the authority's dispatch
    /// thread; only the stop path may additionally be entered from
    /// [`ServiceController::stop`].
    fn on_control_request(self: &Arc<Self>, request: ControlRequest) -> HandlerOutcome {
        debug!("{}: control request {:?}", self.config.name, request);
        match request {
            ControlRequest::Interrogate => HandlerOutcome::Handled,
            ControlRequest::Stop if self.config.can_stop => {
                self.request_stop();
                HandlerOutcome::Handled
            }
            ControlRequest::Pause if self.config.can_pause_continue => {
                if self.pause() {
                    HandlerOutcome::Handled
                } else {
                    HandlerOutcome::NotImplemented
                }
            }
            ControlRequest::Continue if self.config.can_pause_continue => {
                if self.resume() {
                    HandlerOutcome::Handled
                } else {
                    HandlerOutcome::NotImplemented
                }
            }
            ControlRequest::Shutdown if self.config.can_shutdown => {
                self.shutdown();
                HandlerOutcome::Handled
            }
            ControlRequest::DeviceEvent { event_type, data } => {
                let ctx = self.context();
                lock(&self.service).on_device_event(&ctx, event_type, &data);
                HandlerOutcome::Handled
            }
            ControlRequest::SessionChange {
                event_type,
                session_id,
            } if self.config.can_session_change => {
                let ctx = self.context();
                lock(&self.service).on_session_change(&ctx, event_type, session_id);
                HandlerOutcome::Handled
            }
            _ => HandlerOutcome::NotImplemented,
        }
    }

    /// The stop transition. Both the authority-delivered Stop control and
    /// the public stop request converge here; the guarded check-and-set
    /// ensures exactly one `on_stop` invocation and one terminal report.
    fn request_stop(self: &Arc<Self>) {
        {
            let mut initiated = lock(&self.stop_initiated);
            if *initiated {
                return;
            }
            if lock(&self.sink).is_none() {
                // Not registered; there is no transition to run.
                return;
            }
            if lock(&self.status).state() == ServiceState::Stopped {
                return;
            }
            *initiated = true;
        }

        self.write_event_log_entry("stop requested");
        self.set_service_status(ServiceState::StopPending, 0, self.config.pending_wait_hint());

        let ctx = self.context();
        let stopped = lock(&self.service).on_stop(&ctx);
        match stopped {
            Ok(()) => {
                self.set_service_status(ServiceState::Stopped, 0, Duration::ZERO);
                self.write_event_log_entry("service stopped");
            }
            Err(e) => {
                // Stop completes the transition even when cleanup fails; an
                // authority left without a terminal report would treat the
                // process as hung.
                self.write_error_log_entry("on_stop", &e);
                self.set_service_status(ServiceState::Stopped, ERROR_EXIT_CODE, Duration::ZERO);
            }
        }
    }

    /// Pause transition; only legal while running.
    fn pause(self: &Arc<Self>) -> bool {
        if lock(&self.status).state() != ServiceState::Running {
            return false;
        }
        self.set_service_status(ServiceState::PausePending, 0, self.config.pending_wait_hint());

        let ctx = self.context();
        match lock(&self.service).on_pause(&ctx) {
            Ok(()) => {
                self.set_service_status(ServiceState::Paused, 0, Duration::ZERO);
                self.write_event_log_entry("service paused");
            }
            Err(e) => {
                self.write_error_log_entry("on_pause", &e);
                self.set_service_status(ServiceState::Running, 0, Duration::ZERO);
            }
        }
        true
    }

    /// Continue transition; only legal while paused.
    fn resume(self: &Arc<Self>) -> bool {
        if lock(&self.status).state() != ServiceState::Paused {
            return false;
        }
        self.set_service_status(ServiceState::ContinuePending, 0, self.config.pending_wait_hint());

        let ctx = self.context();
        match lock(&self.service).on_continue(&ctx) {
            Ok(()) => {
                self.set_service_status(ServiceState::Running, 0, Duration::ZERO);
                self.write_event_log_entry("service resumed");
            }
            Err(e) => {
                self.write_error_log_entry("on_continue", &e);
                self.set_service_status(ServiceState::Paused, 0, Duration::ZERO);
            }
        }
        true
    }

    /// One-shot shutdown notification; no state report, the process is about
    /// to die regardless.
    fn shutdown(self: &Arc<Self>) {
        self.write_event_log_entry("system shutdown notification");
        let ctx = self.context();
        if let Err(e) = lock(&self.service).on_shutdown(&ctx) {
            self.write_error_log_entry("on_shutdown", &e);
        }
    }

    /// Single choke point for status mutation and reporting. Recomputes the
    /// accepted-controls mask for the new state and publishes the record; a
    /// failed publish is logged and the state machine proceeds.
    fn set_service_status(&self, state: ServiceState, exit_code: u32, wait_hint: Duration) {
        let report = {
            let mut status = lock(&self.status);
            let accepted = self.config.accepted_in(state);
            status.transition(state, exit_code, wait_hint, accepted)
        };
        self.publish(&report);
    }

    /// Same-state re-report with an advanced checkpoint, proving liveness
    /// during a long transition.
    pub(crate) fn report_progress(&self) {
        let report = {
            let mut status = lock(&self.status);
            let state = status.state();
            let exit_code = status.exit_code();
            let wait_hint = status.wait_hint();
            let accepted = self.config.accepted_in(state);
            status.transition(state, exit_code, wait_hint, accepted)
        };
        self.publish(&report);
    }

    fn publish(&self, report: &StatusReport) {
        let sink = lock(&self.sink);
        if let Some(sink) = sink.as_ref() {
            if let Err(e) = sink.report(report) {
                self.write_error_log_entry("report_status", &e);
            }
        }
    }

    fn context(self: &Arc<Self>) -> ServiceContext {
        ServiceContext::new(Arc::downgrade(self), self.config.name.clone())
    }

    fn set_fatal(&self, err: anyhow::Error) {
        let mut fatal = lock(&self.fatal);
        if fatal.is_none() {
            *fatal = Some(err);
        }
    }

    // Fire-and-forget diagnostic writes; the log sink can never destabilize
    // the state machine.
    fn write_event_log_entry(&self, message: &str) {
        info!("{}: {}", self.config.name, message);
    }

    fn write_error_log_entry(&self, function: &str, err: &anyhow::Error) {
        error!("{}: {} failed: {:#}", self.config.name, function, err);
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use std::sync::Mutex;

    // run() binds the process-wide controller slot, so lifecycle tests must
    // not overlap across modules.
    pub(crate) static RUN_LOCK: Mutex<()> = Mutex::new(());
}
