//! Main entry point for the orchestrator binary
//!
//! Launches a cluster from command line flags, waits until it is healthy,
//! prints the run record and keeps it running until Ctrl+C.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use orchestrator::{
    CrashMonitor, DiagnosticWrapper, HostSpec, HttpStatusSource, LaunchArgs, LifecycleController, OrchestratorError,
    OrchestratorOptions, OrchestratorResult, TokioSpawner, TopologyPlanner,
};
use shared::{logging, process_error, process_info, process_warn, ProcessId, Protocol};

/// Cluster orchestrator for multi-role database deployments
#[derive(Parser, Debug)]
#[command(name = "orchestrator")]
#[command(about = "Plans, launches and supervises a local or multi-host database cluster")]
pub struct Args {
    /// Server executable started for every instance
    #[arg(long)]
    pub executable: PathBuf,

    /// Number of query routers
    #[arg(long, default_value = "1")]
    pub coordinators: u32,

    /// Number of primary data servers
    #[arg(long, default_value = "2")]
    pub dbservers: u32,

    /// Size of the coordination quorum (odd sizes recommended)
    #[arg(long, default_value = "3")]
    pub agency_size: u32,

    /// Permitted host as `address[/roles]`, roles being `c` and/or `d` (repeatable)
    #[arg(long = "host")]
    pub hosts: Vec<HostSpec>,

    /// Transport for every endpoint (tcp or ssl)
    #[arg(long, default_value = "tcp")]
    pub protocol: Protocol,

    /// Directory runs are created under
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Exclusive upper bound for allocated ports
    #[arg(long)]
    pub max_port: Option<u16>,

    /// Extra `key=value` argument passed to every instance (repeatable)
    #[arg(long = "arg")]
    pub extra_args: Vec<String>,

    /// Run instances with info-level logging instead of errors only
    #[arg(long)]
    pub verbose: bool,

    /// Run instances under this memory checker
    #[arg(long)]
    pub valgrind: Option<PathBuf>,

    /// `key=value` option for the memory checker (repeatable)
    #[arg(long = "valgrind-arg")]
    pub valgrind_args: Vec<String>,

    /// Prefix for memory checker output files
    #[arg(long, default_value = "")]
    pub valgrind_file_base: String,

    /// Write memory checker reports as XML
    #[arg(long)]
    pub valgrind_xml: bool,

    /// Record instances with rr
    #[arg(long, conflicts_with = "valgrind")]
    pub rr: bool,

    /// Attach this crash-dump tool to every instance
    #[arg(long)]
    pub crash_monitor: Option<PathBuf>,

    /// Do not attach a crash-dump tool even where one is attached by default
    #[arg(long, conflicts_with = "crash_monitor")]
    pub no_crash_monitor: bool,

    /// Make quorum writes wait for sync
    #[arg(long)]
    pub agency_wait_for_sync: bool,

    /// Health polls before giving up
    #[arg(long, default_value = "1200")]
    pub health_attempts: u32,

    /// Milliseconds between health polls
    #[arg(long, default_value = "500")]
    pub health_interval_ms: u64,

    /// Seconds an instance gets to exit before it is killed
    #[arg(long, default_value = "60")]
    pub shutdown_grace_secs: u64,

    /// Keep the run directory after shutdown
    #[arg(long)]
    pub keep_data: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    fn options(&self) -> OrchestratorResult<OrchestratorOptions> {
        let wrapper = match (&self.valgrind, self.rr) {
            (Some(binary), _) => DiagnosticWrapper::Valgrind {
                binary: binary.clone(),
                args: LaunchArgs::from_assignments(&self.valgrind_args)?,
                file_base: self.valgrind_file_base.clone(),
                xml: self.valgrind_xml,
            },
            (None, true) => DiagnosticWrapper::Rr {
                binary: PathBuf::from("rr"),
            },
            (None, false) => DiagnosticWrapper::None,
        };

        let mut builder = OrchestratorOptions::builder()
            .executable(&self.executable)
            .protocol(self.protocol)
            .verbose(self.verbose)
            .max_port(self.max_port)
            .extra_args(LaunchArgs::from_assignments(&self.extra_args)?)
            .wrapper(wrapper)
            .agency_wait_for_sync(self.agency_wait_for_sync)
            .health_polling(Duration::from_millis(self.health_interval_ms), self.health_attempts)
            .shutdown_grace(Duration::from_secs(self.shutdown_grace_secs));

        if let Some(dir) = &self.base_dir {
            builder = builder.base_dir(dir);
        }
        if let Some(binary) = &self.crash_monitor {
            builder = builder.crash_monitor(Some(CrashMonitor { binary: binary.clone() }));
        } else if self.no_crash_monitor {
            builder = builder.crash_monitor(None);
        }

        builder.build()
    }
}

#[tokio::main]
async fn main() -> OrchestratorResult<()> {
    let args = Args::parse();

    ProcessId::init_orchestrator();
    logging::init_tracing(Some(&args.log_level));
    logging::log_startup(
        ProcessId::current(),
        &format!(
            "orchestrator ({} agents, {} dbservers, {} coordinators)",
            args.agency_size, args.dbservers, args.coordinators
        ),
    );

    let options = args.options()?;
    let planner = TopologyPlanner::new().with_agency_size(args.agency_size);
    let plan = if args.hosts.is_empty() {
        planner.plan_single_host("127.0.0.1", args.coordinators, args.dbservers)?
    } else {
        planner.plan(args.coordinators, args.dbservers, &args.hosts)?
    };

    let status = HttpStatusSource::new(Duration::from_secs(10))?;
    let mut controller = LifecycleController::new(plan, options, Arc::new(TokioSpawner::new()), status);

    if let Err(e) = controller.launch().await {
        logging::log_error(ProcessId::current(), "Launch", &e);
        return Err(e);
    }

    if let Err(e) = controller.wait_until_healthy().await {
        logging::log_error(ProcessId::current(), "Health check", &e);
        shutdown(&mut controller, args.keep_data).await?;
        return Err(e);
    }

    if let Some(record) = controller.record() {
        println!("{}", serde_json::to_string_pretty(record)?);
        process_info!(ProcessId::current(), "✅ Cluster ready at {}", record.url());
    }

    match signal::ctrl_c().await {
        Ok(()) => logging::log_shutdown(ProcessId::current(), "Received Ctrl+C signal"),
        Err(err) => logging::log_error(ProcessId::current(), "Signal handling", &err),
    }

    shutdown(&mut controller, args.keep_data).await?;
    logging::log_success(ProcessId::current(), "Orchestrator stopped gracefully");
    Ok(())
}

async fn shutdown(controller: &mut LifecycleController<TokioSpawner, HttpStatusSource>, keep_data: bool) -> OrchestratorResult<()> {
    let report = controller.shutdown().await?;
    for result in report.results.iter().filter(|r| !r.clean) {
        process_warn!(
            ProcessId::current(),
            "⚠️ {} did not stop cleanly (killed: {}, error: {:?})",
            result.name,
            result.killed,
            result.error
        );
    }

    if report.error {
        process_error!(ProcessId::current(), "❌ unable to shut down cluster (status {})", report.status_code());
        return Err(OrchestratorError::ShutdownIncomplete);
    }

    if keep_data {
        if let Some(record) = controller.record() {
            process_info!(ProcessId::current(), "📁 Keeping run directory {}", record.run_root.display());
        }
        return Ok(());
    }

    controller.cleanup().await
}
