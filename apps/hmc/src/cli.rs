//! Command line interface definition

use clap::{Parser, Subcommand};
use hmc_types::OutputFormat;
use std::path::PathBuf;

/// hmc - cluster lifecycle orchestrator
#[derive(Parser)]
#[command(name = "hmc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Install, uninstall and track lifecycle operations across cluster hosts")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output format for query commands
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// State database path
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Per-dispatch agent timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub dispatch_timeout: Option<u64>,

    /// Maximum hosts dispatched at once (0 = auto)
    #[arg(long, global = true, value_name = "N")]
    pub max_concurrent_hosts: Option<usize>,

    /// Return once the request is accepted instead of driving it to
    /// completion; unfinished work resumes on the next start
    #[arg(long, global = true)]
    pub no_wait: bool,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Uninstall a cluster and print the transaction envelope
    Uninstall {
        /// Cluster name
        cluster: String,

        /// Remove data as well as software
        #[arg(long = "wipe-out", alias = "wipeout")]
        wipe_out: bool,

        /// User the uninstall is performed as
        #[arg(long, env = "HMC_DEPLOY_USER")]
        deploy_user: String,
    },

    /// Request any lifecycle operation
    #[command(alias = "op")]
    Lifecycle {
        /// Cluster name
        cluster: String,

        /// install, uninstall, upgrade or reconfigure
        op: String,

        /// Operation option as KEY=VALUE (repeatable)
        #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,
    },

    /// Show a transaction's progress
    #[command(alias = "poll")]
    Status {
        /// Transaction id
        txn_id: String,
    },

    /// Cancel a running transaction
    Cancel {
        /// Transaction id
        txn_id: String,
    },

    /// Re-run the hosts of a finished transaction that did not succeed
    Retry {
        /// Transaction id
        txn_id: String,
    },

    /// List recent transactions
    #[command(alias = "ls")]
    List {
        /// Only transactions of this cluster
        #[arg(long)]
        cluster: Option<String>,

        /// Maximum number of transactions
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Manage the cluster registry
    #[command(subcommand)]
    Cluster(ClusterCommands),

    /// Drive transactions left unfinished by a previous run
    Resume,

    /// Delete finished transactions older than the retention period
    Prune,
}

/// Cluster registry commands
#[derive(Subcommand)]
pub enum ClusterCommands {
    /// Register a cluster or replace its host set
    Add {
        /// Cluster name
        name: String,

        /// Member hosts as HOST or HOST:ROLE1,ROLE2
        #[arg(required = true)]
        hosts: Vec<String>,
    },

    /// List registered clusters
    List,

    /// Show one cluster
    Show {
        /// Cluster name
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uninstall_with_wipe_out() {
        let cli = Cli::try_parse_from([
            "hmc",
            "uninstall",
            "c1",
            "--wipe-out",
            "--deploy-user",
            "hdp",
        ])
        .unwrap();
        match cli.command {
            Commands::Uninstall {
                cluster,
                wipe_out,
                deploy_user,
            } => {
                assert_eq!(cluster, "c1");
                assert!(wipe_out);
                assert_eq!(deploy_user, "hdp");
            }
            _ => panic!("expected uninstall"),
        }
    }

    #[test]
    fn parses_lifecycle_options_and_globals() {
        let cli = Cli::try_parse_from([
            "hmc",
            "lifecycle",
            "c1",
            "uninstall",
            "-o",
            "wipeout=true",
            "--no-wait",
            "--db",
            "/tmp/hmc.sqlite",
        ])
        .unwrap();
        assert!(cli.global.no_wait);
        assert_eq!(cli.global.db, Some(PathBuf::from("/tmp/hmc.sqlite")));
        assert!(matches!(
            cli.command,
            Commands::Lifecycle { ref options, .. } if options == &["wipeout=true"]
        ));
    }

    #[test]
    fn cluster_add_requires_hosts() {
        assert!(Cli::try_parse_from(["hmc", "cluster", "add", "c1"]).is_err());
        let cli =
            Cli::try_parse_from(["hmc", "cluster", "add", "c1", "h1:NAMENODE", "h2"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cluster(ClusterCommands::Add { ref hosts, .. }) if hosts.len() == 2
        ));
    }
}
