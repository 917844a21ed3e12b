//! Console-mode control authority
//!
//! Drives the same lifecycle as the service manager when the process is run
//! from a terminal: the entry point is invoked directly, and a SIGTERM/SIGINT
//! (Ctrl-C elsewhere) is translated into a Stop control. Useful for
//! development and as the fallback when the process was not launched as a
//! managed service.

use anyhow::{Context, Result};
use log::{debug, info};
use std::env;
use std::ffi::OsString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::authority::{ControlAuthority, ControlHandler, ControlRequest, StatusSink};
use crate::controller;
use crate::status::{ServiceState, StatusReport};

pub struct ConsoleAuthority {
    args: Vec<OsString>,
    handler: Mutex<Option<ControlHandler>>,
    terminal: Arc<Notify>,
    stopped: Arc<AtomicBool>,
}

impl ConsoleAuthority {
    /// Authority delivering the given startup arguments to the entry point
    pub fn new(args: Vec<OsString>) -> Self {
        Self {
            args,
            handler: Mutex::new(None),
            terminal: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Authority forwarding the process command line (minus the program name)
    pub fn from_env() -> Self {
        Self::new(env::args_os().skip(1).collect())
    }
}

impl Default for ConsoleAuthority {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ControlAuthority for ConsoleAuthority {
    fn run_dispatcher(&self, name: &str) -> Result<()> {
        info!("{}: running in console mode", name);
        controller::service_main(self.args.clone());

        if self.stopped.load(Ordering::SeqCst) {
            // Start failed, or a stop raced the startup; nothing to wait for.
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build signal-handling runtime")?;

        let signaled = runtime.block_on(async {
            tokio::select! {
                signal = stop_signal() => signal.map(Some),
                _ = self.terminal.notified() => Ok(None),
            }
        })?;

        if let Some(signal) = signaled {
            info!("{}: received {}, stopping service", name, signal);
            let handler = self
                .handler
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(handler) = handler.as_ref() {
                handler(ControlRequest::Stop);
            }
        }
        Ok(())
    }

    fn register_handler(&self, _name: &str, handler: ControlHandler) -> Result<Box<dyn StatusSink>> {
        *self
            .handler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handler);
        Ok(Box::new(ConsoleStatusSink {
            terminal: Arc::clone(&self.terminal),
            stopped: Arc::clone(&self.stopped),
        }))
    }
}

#[cfg(unix)]
async fn stop_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;
    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn stop_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl-C")?;
    Ok("Ctrl-C")
}

/// Status handle for console mode: reports go to the log, and the terminal
/// one wakes the dispatcher.
struct ConsoleStatusSink {
    terminal: Arc<Notify>,
    stopped: Arc<AtomicBool>,
}

impl StatusSink for ConsoleStatusSink {
    fn report(&self, report: &StatusReport) -> Result<()> {
        debug!(
            "status: {:?} accepted={:?} checkpoint={} exit={}",
            report.state, report.controls_accepted, report.checkpoint, report.exit_code
        );
        if report.state == ServiceState::Stopped {
            self.stopped.store(true, Ordering::SeqCst);
            self.terminal.notify_one();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::tests_support::RUN_LOCK;
    use crate::controller::ServiceController;
    use crate::service::{Service, ServiceContext};
    use crate::ServiceConfig;
    use std::thread;
    use std::time::{Duration, Instant};

    struct FailingStart;

    impl Service for FailingStart {
        fn on_start(&mut self, _ctx: &ServiceContext, _args: &[OsString]) -> Result<()> {
            anyhow::bail!("nothing to run");
        }
    }

    struct Idle;

    impl Service for Idle {
        fn on_start(&mut self, _ctx: &ServiceContext, _args: &[OsString]) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_start_failure_returns_without_waiting_for_signals() {
        let _serial = RUN_LOCK.lock().unwrap();
        let controller = ServiceController::new(
            ServiceConfig::new("ConsoleDemo"),
            FailingStart,
            ConsoleAuthority::default(),
        );
        // Would hang on the signal wait if the terminal report were ignored.
        assert!(controller.run().is_err());
    }

    #[test]
    fn test_external_stop_wakes_dispatcher() {
        let _serial = RUN_LOCK.lock().unwrap();
        let controller = ServiceController::new(
            ServiceConfig::new("ConsoleDemo"),
            Idle,
            ConsoleAuthority::default(),
        );

        let runner = {
            let controller = controller.clone();
            thread::spawn(move || controller.run())
        };

        // stop() is a no-op until registration lands, so keep requesting.
        let deadline = Instant::now() + Duration::from_secs(5);
        while !runner.is_finished() {
            assert!(Instant::now() < deadline, "dispatcher never woke up");
            controller.stop();
            thread::sleep(Duration::from_millis(10));
        }
        runner.join().unwrap().unwrap();
    }
}
