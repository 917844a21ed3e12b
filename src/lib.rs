//! Service-shell - lifecycle shell for long-running background services
//!
//! Wraps the boilerplate of running as a managed service: registers with a
//! control authority (the Windows Service Control Manager, or an in-process
//! console fallback), translates delivered control codes into lifecycle
//! callbacks on a [`Service`] implementation, and keeps the authority
//! informed through status reports so the process is never declared
//! unresponsive mid-transition.

pub mod authority;
pub mod config;
pub mod console;
pub mod controller;
pub mod service;
pub mod status;

#[cfg(target_os = "windows")]
pub mod scm;

pub use authority::{ControlAuthority, ControlRequest, HandlerOutcome, StatusSink};
pub use config::ServiceConfig;
pub use console::ConsoleAuthority;
pub use controller::ServiceController;
pub use service::{Service, ServiceContext};
pub use status::{ControlsAccepted, ServiceState, StatusReport};

#[cfg(target_os = "windows")]
pub use scm::ScmAuthority;
