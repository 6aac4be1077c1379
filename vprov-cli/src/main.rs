//! vprov: converge one remote resource from a JSON run file.
//!
//! Results are written to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vprov_engine::{CancelSignal, ReconcileConfig, Reconciler, RunContext};
use vprov_rest::{HttpReadiness, RestClient, RestConfig, RestResource, Url};

mod runfile;

use runfile::{wait_config, RunFile, WaitOverrides};

#[derive(Parser)]
#[command(name = "vprov", version)]
#[command(about = "Converge remote resources towards a declared state")]
struct Cli {
    #[command(flatten)]
    conn: ConnectionArgs,

    #[command(flatten)]
    wait: WaitArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Appliance API base URL (overrides the run file)
    #[arg(long, global = true, env = "VPROV_ENDPOINT")]
    endpoint: Option<String>,

    /// Username for basic auth
    #[arg(long, global = true)]
    username: Option<String>,

    /// Password for basic auth
    #[arg(long, global = true, env = "VPROV_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Bearer token (takes precedence over basic auth)
    #[arg(long, global = true, env = "VPROV_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Accept self-signed TLS certificates
    #[arg(long, global = true)]
    insecure: bool,
}

#[derive(Args, Debug)]
struct WaitArgs {
    /// Maximum readiness checks per wait [default: 30]
    #[arg(long, global = true)]
    max_wait_attempts: Option<u32>,

    /// Seconds between readiness checks [default: 15]
    #[arg(long, global = true)]
    wait_delay_seconds: Option<u64>,

    /// Timeout for each remote call, in seconds
    #[arg(long, global = true)]
    timeout_seconds: Option<u64>,
}

impl WaitArgs {
    fn overrides(&self) -> WaitOverrides {
        WaitOverrides {
            max_attempts: self.max_wait_attempts,
            delay_seconds: self.wait_delay_seconds,
            timeout_seconds: self.timeout_seconds,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Converge the resource and print the outcome
    Apply {
        /// Run file (JSON)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show what apply would do without changing anything
    Plan {
        /// Run file (JSON)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Poll a URL until it answers 200
    WaitHttp {
        /// URL to poll
        #[arg(long)]
        url: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vprov=info,vprov_engine=info,vprov_rest=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command succeeded.
async fn run(cli: Cli) -> Result<bool> {
    let cancel = cancel_on_ctrl_c();

    match &cli.command {
        Commands::Apply { file } => {
            let run_file = RunFile::load(file)?;
            let reconciler = reconciler(&cli, &run_file, cancel)?;
            let outcome = reconciler.reconcile(&run_file.spec()).await;
            print_json(&outcome)?;
            Ok(outcome.is_ok())
        }
        Commands::Plan { file } => {
            let run_file = RunFile::load(file)?;
            let reconciler = reconciler(&cli, &run_file, cancel)?;
            let plan = reconciler
                .plan(&run_file.spec())
                .await
                .context("failed to plan")?;
            print_json(&plan)?;
            Ok(true)
        }
        Commands::WaitHttp { url } => {
            let client = RestClient::new(&rest_config(&cli.conn, url.clone()))?;
            let url = client.base().clone();
            let config = ReconcileConfig {
                wait: wait_config(cli.wait.overrides(), WaitOverrides::default()),
                operation_timeout: cli
                    .wait
                    .timeout_seconds
                    .map(std::time::Duration::from_secs),
                ..Default::default()
            };
            config.validate().context("invalid wait settings")?;

            let ctx = RunContext::new(config, cancel);
            let result = ctx
                .wait_for(&HttpReadiness::new(client, url))
                .await
                .context("readiness check failed")?;
            print_json(&result)?;
            Ok(result.succeeded)
        }
    }
}

fn rest_config(conn: &ConnectionArgs, endpoint: String) -> RestConfig {
    RestConfig {
        username: conn.username.clone(),
        password: conn.password.clone(),
        token: conn.token.clone(),
        insecure: conn.insecure,
        ..RestConfig::new(endpoint)
    }
}

fn reconciler(
    cli: &Cli,
    run_file: &RunFile,
    cancel: CancelSignal,
) -> Result<Reconciler<RestResource, RestResource>> {
    let Some(endpoint) = cli.conn.endpoint.clone().or_else(|| run_file.endpoint.clone()) else {
        bail!("no endpoint given (use --endpoint or set \"endpoint\" in the run file)");
    };
    let client = RestClient::new(&rest_config(&cli.conn, endpoint))?;

    let mut resource = RestResource::new(client, run_file.collection.clone());
    if let Some(url) = &run_file.readiness_url {
        let url = url
            .parse::<Url>()
            .with_context(|| format!("invalid readiness_url {}", url))?;
        resource = resource.with_readiness_url(url);
    }

    let config = run_file.reconcile_config(cli.wait.overrides())?;
    info!(
        target_id = %run_file.target,
        collection = %run_file.collection,
        max_attempts = config.wait.max_attempts,
        "Loaded run file"
    );

    Ok(Reconciler::for_backend(resource)
        .with_config(config)?
        .with_table(run_file.update_mode.table())
        .with_cancel(cancel))
}

/// Flip the cancel signal on Ctrl-C; in-flight waits end as cancelled.
fn cancel_on_ctrl_c() -> CancelSignal {
    let (handle, signal) = CancelSignal::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            handle.cancel();
        }
    });
    signal
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to encode result")?;
    println!("{}", text);
    Ok(())
}
