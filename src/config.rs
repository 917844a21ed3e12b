//! Service identity and capability configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::status::{ControlsAccepted, ServiceState};

/// Identity and capabilities of a service, fixed for the lifetime of its
/// controller.
///
/// The capability flags decide which control codes are advertised to the
/// control authority and therefore which lifecycle callbacks can ever be
/// invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name, used for authority registration and in log entries
    pub name: String,

    /// Whether the service accepts a Stop control
    pub can_stop: bool,

    /// Whether the service is notified of system shutdown
    pub can_shutdown: bool,

    /// Whether the service accepts Pause and Continue controls
    pub can_pause_continue: bool,

    /// Whether the service is notified of session changes
    pub can_session_change: bool,

    /// Wait hint reported while a transition is pending (in seconds)
    pub pending_wait_hint_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "service-shell".to_string(),
            can_stop: true,
            can_shutdown: true,
            can_pause_continue: false,
            can_session_change: false,
            pending_wait_hint_secs: 30,
        }
    }
}

impl ServiceConfig {
    /// Configuration with the given name and default capabilities
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Full capability mask, before narrowing by state
    pub fn capability_mask(&self) -> ControlsAccepted {
        let mut mask = ControlsAccepted::empty();
        if self.can_stop {
            mask |= ControlsAccepted::STOP;
        }
        if self.can_shutdown {
            mask |= ControlsAccepted::SHUTDOWN;
        }
        if self.can_pause_continue {
            mask |= ControlsAccepted::PAUSE_CONTINUE;
        }
        if self.can_session_change {
            mask |= ControlsAccepted::SESSION_CHANGE;
        }
        mask
    }

    /// Controls accepted while in `state`: the capability mask intersected
    /// with the transitions that are legal from that state.
    pub fn accepted_in(&self, state: ServiceState) -> ControlsAccepted {
        self.capability_mask() & state.legal_controls()
    }

    /// Wait hint to report for pending transitions
    pub fn pending_wait_hint(&self) -> Duration {
        Duration::from_secs(self.pending_wait_hint_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capabilities() {
        let config = ServiceConfig::default();
        assert!(config.can_stop);
        assert!(config.can_shutdown);
        assert!(!config.can_pause_continue);
        assert!(!config.can_session_change);

        let mask = config.capability_mask();
        assert!(mask.contains(ControlsAccepted::STOP));
        assert!(mask.contains(ControlsAccepted::SHUTDOWN));
        assert!(!mask.contains(ControlsAccepted::PAUSE_CONTINUE));
    }

    #[test]
    fn test_config_serialization() {
        let config = ServiceConfig::new("Demo");

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"name\":\"Demo\""));
        assert!(json.contains("\"can_stop\":true"));

        let parsed: ServiceConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.name, "Demo");
        assert_eq!(parsed.pending_wait_hint_secs, 30);
    }

    #[test]
    fn test_accepted_mask_narrowed_by_state() {
        let mut config = ServiceConfig::new("Demo");
        config.can_pause_continue = true;
        config.can_session_change = true;

        assert_eq!(
            config.accepted_in(ServiceState::Running),
            config.capability_mask()
        );
        assert_eq!(
            config.accepted_in(ServiceState::Stopped),
            ControlsAccepted::empty()
        );
        assert_eq!(
            config.accepted_in(ServiceState::StopPending),
            ControlsAccepted::empty()
        );
        assert!(!config
            .accepted_in(ServiceState::PausePending)
            .contains(ControlsAccepted::PAUSE_CONTINUE));
        assert!(config
            .accepted_in(ServiceState::Paused)
            .contains(ControlsAccepted::PAUSE_CONTINUE));
    }
}
