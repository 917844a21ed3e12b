//! Service state, accepted-controls mask, and the status record published to
//! the control authority

use bitflags::bitflags;
use std::time::Duration;

/// Lifecycle states reportable to the control authority.
///
/// `Stopped` is terminal. Shutdown is a one-shot notification, not a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    StartPending,
    Running,
    PausePending,
    Paused,
    ContinuePending,
    StopPending,
    Stopped,
}

impl ServiceState {
    /// Controls that are legal to deliver while in this state, before
    /// intersecting with the service's declared capabilities.
    pub fn legal_controls(self) -> ControlsAccepted {
        match self {
            // No controls until the start transition has finished, and none
            // once a stop is underway.
            ServiceState::StartPending | ServiceState::StopPending | ServiceState::Stopped => {
                ControlsAccepted::empty()
            }
            ServiceState::Running | ServiceState::Paused => ControlsAccepted::all(),
            // Mid pause/continue transition: no re-entrant pause/continue.
            ServiceState::PausePending | ServiceState::ContinuePending => {
                ControlsAccepted::STOP
                    | ControlsAccepted::SHUTDOWN
                    | ControlsAccepted::SESSION_CHANGE
            }
        }
    }
}

bitflags! {
    /// Controls the service currently accepts, advertised to the authority
    /// with every status report. Bit values follow the SERVICE_ACCEPT_*
    /// constants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControlsAccepted: u32 {
        const STOP = 0x0000_0001;
        const PAUSE_CONTINUE = 0x0000_0002;
        const SHUTDOWN = 0x0000_0004;
        const SESSION_CHANGE = 0x0000_0080;
    }
}

/// One status report, forwarded in full to the authority on every mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub state: ServiceState,
    pub controls_accepted: ControlsAccepted,
    pub exit_code: u32,
    pub checkpoint: u32,
    pub wait_hint: Duration,
}

/// Mutable status record owned by the controller.
///
/// The checkpoint proves liveness to the authority: a report repeating the
/// previous state increments it (a progress ping during a long transition),
/// a report changing state resets it to zero.
#[derive(Debug)]
pub struct StatusRecord {
    state: ServiceState,
    exit_code: u32,
    checkpoint: u32,
    wait_hint: Duration,
    last_reported: Option<ServiceState>,
}

impl StatusRecord {
    pub fn new() -> Self {
        Self {
            state: ServiceState::StartPending,
            exit_code: 0,
            checkpoint: 0,
            wait_hint: Duration::ZERO,
            last_reported: None,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn exit_code(&self) -> u32 {
        self.exit_code
    }

    pub fn wait_hint(&self) -> Duration {
        self.wait_hint
    }

    /// Advance the record to `state` and produce the report to publish.
    /// `controls_accepted` is recomputed by the caller from capabilities and
    /// the new state.
    pub fn transition(
        &mut self,
        state: ServiceState,
        exit_code: u32,
        wait_hint: Duration,
        controls_accepted: ControlsAccepted,
    ) -> StatusReport {
        self.checkpoint = if self.last_reported == Some(state) {
            self.checkpoint + 1
        } else {
            0
        };
        self.last_reported = Some(state);
        self.state = state;
        self.exit_code = exit_code;
        self.wait_hint = wait_hint;

        StatusReport {
            state,
            controls_accepted,
            exit_code,
            checkpoint: self.checkpoint,
            wait_hint,
        }
    }
}

impl Default for StatusRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_report_starts_at_checkpoint_zero() {
        let mut record = StatusRecord::new();
        let report = record.transition(
            ServiceState::StartPending,
            0,
            Duration::from_secs(30),
            ControlsAccepted::empty(),
        );
        assert_eq!(report.state, ServiceState::StartPending);
        assert_eq!(report.checkpoint, 0);
    }

    #[test]
    fn test_checkpoint_increments_on_repeated_state() {
        let mut record = StatusRecord::new();
        let hint = Duration::from_secs(30);

        let first = record.transition(
            ServiceState::StopPending,
            0,
            hint,
            ControlsAccepted::empty(),
        );
        let second = record.transition(
            ServiceState::StopPending,
            0,
            hint,
            ControlsAccepted::empty(),
        );
        let third = record.transition(
            ServiceState::StopPending,
            0,
            hint,
            ControlsAccepted::empty(),
        );
        assert_eq!(first.checkpoint, 0);
        assert_eq!(second.checkpoint, 1);
        assert_eq!(third.checkpoint, 2);
    }

    #[test]
    fn test_checkpoint_resets_on_state_change() {
        let mut record = StatusRecord::new();
        let hint = Duration::ZERO;

        record.transition(ServiceState::StartPending, 0, hint, ControlsAccepted::empty());
        record.transition(ServiceState::StartPending, 0, hint, ControlsAccepted::empty());
        let report = record.transition(ServiceState::Running, 0, hint, ControlsAccepted::STOP);
        assert_eq!(report.checkpoint, 0);
    }

    #[test]
    fn test_stop_never_legal_once_stopped() {
        assert!(!ServiceState::Stopped
            .legal_controls()
            .contains(ControlsAccepted::STOP));
        assert!(!ServiceState::StopPending
            .legal_controls()
            .contains(ControlsAccepted::STOP));
    }
}
