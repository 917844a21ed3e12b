//! Windows Service Control Manager backend
//!
//! Bridges the controller to the real SCM through the `windows-service`
//! crate: `run_dispatcher` parks the calling thread in
//! `StartServiceCtrlDispatcher`, the generated FFI entry resolves back to the
//! process-wide controller, and the registered handler translates SCM control
//! codes into [`ControlRequest`]s.

use anyhow::{Context, Result};
use std::ffi::OsString;

use windows_service::service::{
    ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState as ScmState,
    ServiceStatus, ServiceType,
};
use windows_service::service_control_handler::{self, ServiceControlHandlerResult, ServiceStatusHandle};
use windows_service::{define_windows_service, service_dispatcher};

use crate::authority::{ControlAuthority, ControlHandler, ControlRequest, HandlerOutcome, StatusSink};
use crate::controller;
use crate::status::{ControlsAccepted, ServiceState, StatusReport};

define_windows_service!(ffi_service_main, scm_service_main);

fn scm_service_main(arguments: Vec<OsString>) {
    controller::service_main(arguments);
}

/// The real service control manager.
pub struct ScmAuthority;

impl ControlAuthority for ScmAuthority {
    fn run_dispatcher(&self, name: &str) -> Result<()> {
        // Blocks until every service in the process has stopped. Fails when
        // the process was not launched by the SCM.
        service_dispatcher::start(name, ffi_service_main)
            .with_context(|| format!("failed to connect {} to the service control manager", name))
    }

    fn register_handler(&self, name: &str, handler: ControlHandler) -> Result<Box<dyn StatusSink>> {
        let event_handler = move |control: ServiceControl| -> ServiceControlHandlerResult {
            match map_control(control) {
                Some(request) => match handler(request) {
                    HandlerOutcome::Handled => ServiceControlHandlerResult::NoError,
                    HandlerOutcome::NotImplemented => ServiceControlHandlerResult::NotImplemented,
                },
                None => ServiceControlHandlerResult::NotImplemented,
            }
        };
        let status_handle = service_control_handler::register(name, event_handler)
            .with_context(|| format!("failed to register control handler for {}", name))?;
        Ok(Box::new(ScmStatusSink { status_handle }))
    }
}

fn map_control(control: ServiceControl) -> Option<ControlRequest> {
    match control {
        ServiceControl::Stop => Some(ControlRequest::Stop),
        ServiceControl::Pause => Some(ControlRequest::Pause),
        ServiceControl::Continue => Some(ControlRequest::Continue),
        ServiceControl::Shutdown => Some(ControlRequest::Shutdown),
        ServiceControl::Interrogate => Some(ControlRequest::Interrogate),
        ServiceControl::SessionChange(param) => Some(ControlRequest::SessionChange {
            event_type: session_reason_code(param.reason),
            session_id: param.notification.session_id,
        }),
        _ => None,
    }
}

// WTS_* session-change reason codes as delivered to the raw handler.
fn session_reason_code(reason: windows_service::service::SessionChangeReason) -> u32 {
    use windows_service::service::SessionChangeReason::*;
    match reason {
        ConsoleConnect => 0x1,
        ConsoleDisconnect => 0x2,
        RemoteConnect => 0x3,
        RemoteDisconnect => 0x4,
        SessionLogon => 0x5,
        SessionLogoff => 0x6,
        SessionLock => 0x7,
        SessionUnlock => 0x8,
        SessionRemoteControl => 0x9,
        _ => 0,
    }
}

struct ScmStatusSink {
    status_handle: ServiceStatusHandle,
}

impl StatusSink for ScmStatusSink {
    fn report(&self, report: &StatusReport) -> Result<()> {
        self.status_handle
            .set_service_status(to_scm_status(report))
            .context("failed to report service status")
    }
}

fn to_scm_status(report: &StatusReport) -> ServiceStatus {
    ServiceStatus {
        service_type: ServiceType::OWN_PROCESS,
        current_state: to_scm_state(report.state),
        controls_accepted: to_scm_accept(report.controls_accepted),
        exit_code: ServiceExitCode::Win32(report.exit_code),
        checkpoint: report.checkpoint,
        wait_hint: report.wait_hint,
        process_id: None,
    }
}

fn to_scm_state(state: ServiceState) -> ScmState {
    match state {
        ServiceState::StartPending => ScmState::StartPending,
        ServiceState::Running => ScmState::Running,
        ServiceState::PausePending => ScmState::PausePending,
        ServiceState::Paused => ScmState::Paused,
        ServiceState::ContinuePending => ScmState::ContinuePending,
        ServiceState::StopPending => ScmState::StopPending,
        ServiceState::Stopped => ScmState::Stopped,
    }
}

fn to_scm_accept(accepted: ControlsAccepted) -> ServiceControlAccept {
    let mut accept = ServiceControlAccept::empty();
    if accepted.contains(ControlsAccepted::STOP) {
        accept |= ServiceControlAccept::STOP;
    }
    if accepted.contains(ControlsAccepted::PAUSE_CONTINUE) {
        accept |= ServiceControlAccept::PAUSE_CONTINUE;
    }
    if accepted.contains(ControlsAccepted::SHUTDOWN) {
        accept |= ServiceControlAccept::SHUTDOWN;
    }
    if accepted.contains(ControlsAccepted::SESSION_CHANGE) {
        accept |= ServiceControlAccept::SESSION_CHANGE;
    }
    accept
}
