//! hmc - cluster lifecycle orchestrator
//!
//! This is the request-handler side of the orchestrator: it parses
//! parameters, calls the façade, prints the JSON response and then keeps
//! driving accepted work until it reaches a terminal status.

mod cli;
mod display;
mod error;
mod handlers;
mod logging;

use crate::cli::{Cli, ClusterCommands, Commands, GlobalArgs};
use crate::display::{Output, OutputRenderer};
use crate::error::CliError;
use crate::handlers::{parse_options, parse_txn_id, uninstall_envelope};
use crate::logging::log_event_with_tracing;
use clap::Parser;
use hmc_config::Config;
use hmc_events::EventReceiver;
use hmc_orchestrator::Hmc;
use hmc_state::StateManager;
use hmc_types::{Host, TxnId};
use std::future::Future;
use std::process;
use std::time::Duration;
use tokio::select;
use tracing::{error, info, warn};

/// How long a single wait round lasts before the status is re-checked
const WAIT_ROUND: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("Application error: {}", e);
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

/// Main application logic; returns the process exit code
async fn run(cli: Cli) -> Result<i32, CliError> {
    // Configuration precedence: file (or defaults), then environment, then flags
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;
    apply_cli_config(&mut config, &cli.global)?;

    init_tracing(&config, cli.global.debug);
    info!("Starting hmc v{}", env!("CARGO_PKG_VERSION"));

    let state = StateManager::new(&config.db_path()).await?;
    let (event_sender, mut event_receiver) = hmc_events::channel();
    let hmc = Hmc::builder()
        .with_state(state)
        .with_event_sender(event_sender)
        .with_config(config)
        .build()?;

    if let Err(e) = hmc.prune().await {
        warn!("Failed to prune old transactions: {}", e);
    }

    let renderer = OutputRenderer::new(cli.global.format);
    let wait = !cli.global.no_wait;

    let (output, follow) = with_events(
        execute_command(cli.command, &hmc),
        &mut event_receiver,
    )
    .await?;
    renderer.render(&output)?;

    if wait && !follow.is_empty() {
        with_events(drive_to_completion(&hmc, &follow), &mut event_receiver).await?;
    }
    hmc.shutdown();

    info!("Command completed");
    Ok(output.exit_code())
}

/// Run `work` while draining events into the log
async fn with_events<F: Future>(work: F, event_receiver: &mut EventReceiver) -> F::Output {
    let mut work = Box::pin(work);

    loop {
        select! {
            result = &mut work => {
                // Drain any remaining events
                while let Ok(event) = event_receiver.try_recv() {
                    log_event_with_tracing(&event);
                }
                return result;
            }

            event = event_receiver.recv() => {
                match event {
                    Some(event) => log_event_with_tracing(&event),
                    None => { /* Channel closed: keep waiting for the work to finish */ }
                }
            }
        }
    }
}

/// Execute the specified command.
///
/// Returns the output to render and the transactions this process should
/// keep driving afterwards.
async fn execute_command(
    command: Commands,
    hmc: &Hmc,
) -> Result<(Output, Vec<TxnId>), CliError> {
    match command {
        Commands::Uninstall {
            cluster,
            wipe_out,
            deploy_user,
        } => {
            let start_time = chrono::Utc::now().timestamp();
            let response = hmc.uninstall(&cluster, wipe_out).await;
            let envelope = uninstall_envelope(&response, &cluster, &deploy_user, start_time)?;
            Ok((Output::Envelope(envelope), response.txn_id.into_iter().collect()))
        }

        Commands::Lifecycle {
            cluster,
            op,
            options,
        } => {
            let options = parse_options(&options)?;
            let response = hmc.request_lifecycle_op(&cluster, &op, &options).await;
            let follow = response.txn_id.into_iter().collect();
            Ok((Output::Accept(response), follow))
        }

        Commands::Status { txn_id } => {
            let view = hmc.poll(parse_txn_id(&txn_id)?).await?;
            Ok((Output::Transaction(view), Vec::new()))
        }

        Commands::Cancel { txn_id } => {
            let txn_id = parse_txn_id(&txn_id)?;
            let status = hmc.cancel(txn_id).await?;
            Ok((Output::Cancelled { txn_id, status }, Vec::new()))
        }

        Commands::Retry { txn_id } => {
            let new_id = hmc.retry(parse_txn_id(&txn_id)?).await?;
            let view = hmc.poll(new_id).await?;
            Ok((Output::Transaction(view), vec![new_id]))
        }

        Commands::List { cluster, limit } => {
            let views = hmc.list_transactions(cluster.as_deref(), limit).await?;
            Ok((Output::Transactions(views), Vec::new()))
        }

        Commands::Cluster(cluster_cmd) => match cluster_cmd {
            ClusterCommands::Add { name, hosts } => {
                let hosts = hosts
                    .iter()
                    .map(|raw| Host::parse(raw).map_err(CliError::InvalidArguments))
                    .collect::<Result<Vec<_>, _>>()?;
                let cluster = hmc.register_cluster(&name, hosts).await?;
                Ok((Output::Cluster(cluster), Vec::new()))
            }
            ClusterCommands::List => {
                let clusters = hmc.list_clusters().await?;
                Ok((Output::Clusters(clusters), Vec::new()))
            }
            ClusterCommands::Show { name } => {
                let cluster = hmc.get_cluster(&name).await?;
                Ok((Output::Cluster(cluster), Vec::new()))
            }
        },

        Commands::Resume => {
            let resumed = hmc.resume().await?;
            Ok((Output::Resumed(resumed.clone()), resumed))
        }

        Commands::Prune => {
            let removed = hmc.prune().await?;
            Ok((Output::Pruned(removed), Vec::new()))
        }
    }
}

/// Keep this process alive until every followed transaction is terminal.
///
/// Ctrl-C stops waiting; unfinished transactions stay in the store and are
/// picked up by `hmc resume`.
async fn drive_to_completion(hmc: &Hmc, ids: &[TxnId]) -> Result<(), CliError> {
    for &id in ids {
        loop {
            select! {
                view = hmc.wait_for_terminal(id, WAIT_ROUND) => {
                    let view = view?;
                    if view.status.is_terminal() {
                        info!(txn_id = %id, status = %view.status, "Transaction finished");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted; unfinished transactions resume with `hmc resume`");
                    return Ok(());
                }
            }
        }
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(config: &Config, debug_enabled_flag: bool) {
    let debug_enabled = std::env::var("RUST_LOG").is_ok() || debug_enabled_flag;
    let default_filter = if debug_enabled {
        "info,hmc=debug,hmc::events=debug"
    } else {
        "warn,hmc=info,hmc::events::host_task=warn"
    };
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter))
    };

    // Structured JSON logs to file when a log directory is configured
    if let Some(log_dir) = config.log_dir() {
        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            eprintln!("Warning: Failed to create log directory: {e}");
        } else {
            let log_file = log_dir.join(format!(
                "hmc-{}.log",
                chrono::Utc::now().format("%Y%m%d-%H%M%S")
            ));
            match std::fs::File::create(&log_file) {
                Ok(file) => {
                    tracing_subscriber::fmt()
                        .json()
                        .with_writer(file)
                        .with_env_filter(filter())
                        .init();
                    return;
                }
                Err(e) => eprintln!("Warning: Failed to create log file: {e}"),
            }
        }
    }

    // Stdout carries JSON responses, so console logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter())
        .init();
}

/// Apply CLI configuration overrides (highest precedence)
fn apply_cli_config(config: &mut Config, global: &GlobalArgs) -> Result<(), CliError> {
    if let Some(db) = &global.db {
        config.paths.db_path = Some(db.clone());
    }
    if let Some(secs) = global.dispatch_timeout {
        config.dispatch.timeout_secs = secs;
    }
    if let Some(n) = global.max_concurrent_hosts {
        config.workers.max_concurrent_hosts = n;
    }
    config.validate()?;
    Ok(())
}
