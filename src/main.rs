use anyhow::Result;
use log::{debug, error, info};
use service_shell::{ConsoleAuthority, Service, ServiceConfig, ServiceContext, ServiceController};
use std::env;
use std::ffi::OsString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

static SERVICE_NAME: &str = "ShellDemo";

/// Demo service: a heartbeat worker thread that runs until stopped
struct DemoService {
    shutdown_requested: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl DemoService {
    fn new() -> Self {
        Self {
            shutdown_requested: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl Service for DemoService {
    fn on_start(&mut self, _ctx: &ServiceContext, args: &[OsString]) -> Result<()> {
        info!("Starting demo worker (args: {:?})", args);

        let shutdown = Arc::clone(&self.shutdown_requested);
        self.worker = Some(thread::spawn(move || {
            let mut counter = 0u64;
            while !shutdown.load(Ordering::Relaxed) {
                counter += 1;
                if counter % 5 == 0 {
                    debug!("Demo worker heartbeat, iteration {}", counter);
                }
                thread::sleep(Duration::from_secs(1));
            }
        }));
        Ok(())
    }

    fn on_stop(&mut self, ctx: &ServiceContext) -> Result<()> {
        info!("Stopping demo worker...");
        self.shutdown_requested.store(true, Ordering::Relaxed);

        if let Some(worker) = self.worker.take() {
            // The worker sleeps in one-second ticks; keep the authority
            // informed while it drains.
            ctx.report_progress();
            worker
                .join()
                .map_err(|_| anyhow::anyhow!("demo worker panicked"))?;
        }
        info!("Demo worker stopped");
        Ok(())
    }

    fn on_shutdown(&mut self, _ctx: &ServiceContext) -> Result<()> {
        info!("System is shutting down");
        self.shutdown_requested.store(true, Ordering::Relaxed);
        Ok(())
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    // Initialize logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    // Check for version flag
    if args.contains(&"--version".to_string()) || args.contains(&"-v".to_string()) {
        println!("service-shell demo {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Check for help flag
    if args.contains(&"--help".to_string()) || args.contains(&"-h".to_string()) {
        println!("Service Shell Demo - heartbeat service on the lifecycle shell");
        println!("Version: {}", env!("CARGO_PKG_VERSION"));
        println!("\nUsage: {} [OPTIONS]\n", args[0]);
        println!("Options:");
        println!("  --help, -h        Show this help message");
        println!("  --version, -v     Show version information");
        println!("  --console         Run in console mode (Windows only)");
        println!("\nEnvironment Variables:");
        println!("  RUST_LOG=<level>  Set log level (error|warn|info|debug)");
        return Ok(());
    }

    let config = ServiceConfig::new(SERVICE_NAME);

    // On Windows, prefer the service control manager unless console mode was
    // asked for; fall back to console mode when not launched as a service.
    #[cfg(target_os = "windows")]
    {
        if !args.contains(&"--console".to_string()) {
            info!("Attempting to run under the service control manager...");
            let controller = ServiceController::new(
                config.clone(),
                DemoService::new(),
                service_shell::ScmAuthority,
            );
            match controller.run() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    eprintln!("Failed to run as Windows service: {:#}", e);
                    eprintln!("Running in console mode instead. Use --help for options.");
                }
            }
        }
    }

    info!("Starting in console mode...");
    let controller = ServiceController::new(config, DemoService::new(), ConsoleAuthority::from_env());
    if let Err(e) = controller.run() {
        error!("Service error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
