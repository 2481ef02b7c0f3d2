//! Cluster Test Runner
//!
//! Launches a cluster, runs a test binary emitting a JSON event stream
//! against it, prints per-test results and tears the cluster down. Exits
//! non-zero when any test fails or the cluster does not stop cleanly.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use orchestrator::{HostSpec, LaunchArgs};
use shared::{logging, ProcessId, Protocol};
use tester::{ClusterConstellation, SuiteConfig, TestRunner};

#[derive(Parser)]
#[command(name = "tester")]
#[command(about = "Runs a test binary against a freshly launched cluster")]
struct Args {
    /// Server executable started for every instance
    #[arg(long)]
    executable: PathBuf,

    /// Test binary to run; its stdout must be a JSON event stream
    #[arg(long)]
    test_binary: PathBuf,

    /// Arguments for the test binary
    #[arg(last = true)]
    test_args: Vec<String>,

    #[arg(long, default_value = "1")]
    coordinators: u32,

    #[arg(long, default_value = "2")]
    dbservers: u32,

    #[arg(long, default_value = "3")]
    agency_size: u32,

    /// Permitted host as `address[/roles]` (repeatable)
    #[arg(long = "host")]
    hosts: Vec<HostSpec>,

    #[arg(long, default_value = "tcp")]
    protocol: Protocol,

    /// Directory runs are created under
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Extra `key=value` argument for every instance (repeatable)
    #[arg(long = "arg")]
    extra_args: Vec<String>,

    /// Health polls before giving up
    #[arg(long, default_value = "240")]
    health_attempts: u32,

    /// Milliseconds between health polls
    #[arg(long, default_value = "500")]
    health_interval_ms: u64,

    /// Keep the run directory after the suite
    #[arg(long)]
    keep_data: bool,

    /// Print a JSON report instead of the text listing
    #[arg(long)]
    json: bool,

    /// Enable verbose output for instances
    #[arg(long)]
    verbose: bool,

    /// Do not echo test output while it streams
    #[arg(long)]
    quiet: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn suite(self) -> anyhow::Result<SuiteConfig> {
        let extra_args = LaunchArgs::from_assignments(&self.extra_args).context("invalid --arg")?;
        let mut builder = SuiteConfig::builder()
            .executable(self.executable)
            .test_binary(self.test_binary, self.test_args)
            .coordinators(self.coordinators)
            .dbservers(self.dbservers)
            .agency_size(self.agency_size)
            .protocol(self.protocol)
            .extra_args(extra_args)
            .verbose(self.verbose)
            .echo(!self.quiet)
            .keep_data(self.keep_data)
            .health_polling(Duration::from_millis(self.health_interval_ms), self.health_attempts)
            .log_level(self.log_level);
        for host in self.hosts {
            builder = builder.host(host);
        }
        if let Some(dir) = self.base_dir {
            builder = builder.base_dir(dir);
        }
        Ok(builder.build())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let json = args.json;

    ProcessId::init_tester();
    logging::init_tracing(Some(&args.log_level));

    let config = args.suite()?;
    if !config.is_valid() {
        anyhow::bail!("invalid suite configuration");
    }
    logging::log_startup(ProcessId::current(), &format!("tester ({})", config.test_command().display()));

    let mut constellation = ClusterConstellation::from_config(&config).context("unable to prepare cluster")?;
    let runner = TestRunner::new().with_echo(config.echo);
    let report = constellation
        .execute(&runner, &config.test_command(), config.keep_data)
        .await
        .context("suite run failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.render());
    }

    if !report.passed() {
        logging::log_error(ProcessId::current(), "Suite", &"one or more checks failed");
        std::process::exit(1);
    }

    logging::log_success(ProcessId::current(), "All tests passed");
    Ok(())
}
