//! Output rendering for command results

use hmc_types::{
    AcceptResponse, Cluster, OutputFormat, TransactionStatus, TransactionView, TxnId,
};
use serde_json::{json, Value};

use crate::error::CliError;

/// Result of a command, rendered once it completes
#[derive(Debug)]
pub enum Output {
    /// Endpoint envelope, printed verbatim
    Envelope(Value),
    Accept(AcceptResponse),
    Transaction(TransactionView),
    Transactions(Vec<TransactionView>),
    Cluster(Cluster),
    Clusters(Vec<Cluster>),
    Cancelled {
        txn_id: TxnId,
        status: TransactionStatus,
    },
    Resumed(Vec<TxnId>),
    Pruned(u64),
}

impl Output {
    /// Process exit code: non-zero when the request was rejected
    pub fn exit_code(&self) -> i32 {
        match self {
            Output::Envelope(value) => i32::from(value["result"] != json!(0)),
            Output::Accept(response) => i32::from(!response.is_ok()),
            _ => 0,
        }
    }
}

/// Renders command output to stdout
pub struct OutputRenderer {
    format: OutputFormat,
}

impl OutputRenderer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn render(&self, output: &Output) -> Result<(), CliError> {
        println!("{}", self.to_text(output)?);
        Ok(())
    }

    /// Wire responses are always JSON; the rest follow `--format`
    pub fn to_text(&self, output: &Output) -> Result<String, CliError> {
        let text = match (output, self.format) {
            (Output::Envelope(value), _) => serde_json::to_string(value)?,
            (Output::Accept(response), _) => serde_json::to_string(response)?,
            (output, OutputFormat::Json) => serde_json::to_string_pretty(&to_json(output)?)?,
            (output, OutputFormat::Plain) => to_plain(output),
        };
        Ok(text)
    }
}

fn to_json(output: &Output) -> Result<Value, serde_json::Error> {
    Ok(match output {
        Output::Envelope(value) => value.clone(),
        Output::Accept(response) => serde_json::to_value(response)?,
        Output::Transaction(view) => serde_json::to_value(view)?,
        Output::Transactions(views) => serde_json::to_value(views)?,
        Output::Cluster(cluster) => serde_json::to_value(cluster)?,
        Output::Clusters(clusters) => serde_json::to_value(clusters)?,
        Output::Cancelled { txn_id, status } => json!({ "txnId": txn_id, "status": status }),
        Output::Resumed(ids) => json!({ "resumed": ids }),
        Output::Pruned(removed) => json!({ "removed": removed }),
    })
}

fn to_plain(output: &Output) -> String {
    match output {
        Output::Transaction(view) => transaction_lines(view, true),
        Output::Transactions(views) if views.is_empty() => "No transactions".to_string(),
        Output::Transactions(views) => views
            .iter()
            .map(|view| transaction_lines(view, false))
            .collect::<Vec<_>>()
            .join("\n"),
        Output::Cluster(cluster) => cluster_lines(cluster, true),
        Output::Clusters(clusters) if clusters.is_empty() => "No clusters registered".to_string(),
        Output::Clusters(clusters) => clusters
            .iter()
            .map(|cluster| cluster_lines(cluster, false))
            .collect::<Vec<_>>()
            .join("\n"),
        Output::Cancelled { txn_id, status } => format!("Transaction {txn_id}: {status}"),
        Output::Resumed(ids) if ids.is_empty() => "Nothing to resume".to_string(),
        Output::Resumed(ids) => {
            let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
            format!("Resumed transactions: {}", ids.join(", "))
        }
        Output::Pruned(removed) => format!("Removed {removed} transaction(s)"),
        // Always rendered as JSON by the caller
        Output::Envelope(_) | Output::Accept(_) => String::new(),
    }
}

fn transaction_lines(view: &TransactionView, with_hosts: bool) -> String {
    let wipeout = if view.wipeout { " (wipeout)" } else { "" };
    let mut text = format!(
        "{:>6}  {:<12} {}{}  {}  {}/{} hosts resolved",
        view.txn_id.get(),
        view.cluster_name,
        view.op_kind,
        wipeout,
        view.status,
        view.resolved(),
        view.host_tasks.len()
    );
    if let Some(retry_of) = view.retry_of {
        text.push_str(&format!("  retry of {retry_of}"));
    }
    if with_hosts {
        for task in &view.host_tasks {
            text.push_str(&format!(
                "\n  {:<30} {:<10} attempts={}",
                task.host,
                task.status.as_str(),
                task.attempts
            ));
            if let Some(error) = &task.error {
                text.push_str(&format!("  {error}"));
            }
        }
    }
    text
}

fn cluster_lines(cluster: &Cluster, with_hosts: bool) -> String {
    let mut text = format!(
        "{:<12} {:<15} {} host(s)",
        cluster.name,
        cluster.state.as_str(),
        cluster.hosts.len()
    );
    if let Some(active) = cluster.active_txn_id {
        text.push_str(&format!("  active txn {active}"));
    }
    if with_hosts {
        for host in &cluster.hosts {
            text.push_str(&format!("\n  {:<30} {}", host.name, host.roles.join(",")));
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_is_json_even_in_plain_mode() {
        let renderer = OutputRenderer::new(OutputFormat::Plain);
        let text = renderer
            .to_text(&Output::Accept(AcceptResponse::accepted(TxnId(3))))
            .unwrap();
        assert_eq!(text, r#"{"result":0,"txnId":"3"}"#);
    }

    #[test]
    fn rejected_requests_exit_non_zero() {
        let rejected = AcceptResponse {
            result: 5,
            txn_id: None,
            error: Some("busy".to_string()),
        };
        assert_eq!(Output::Accept(rejected).exit_code(), 1);
        assert_eq!(Output::Accept(AcceptResponse::no_op()).exit_code(), 0);
        assert_eq!(Output::Envelope(json!({ "result": 1 })).exit_code(), 1);
        assert_eq!(Output::Pruned(0).exit_code(), 0);
    }

    #[test]
    fn plain_cluster_listing() {
        let renderer = OutputRenderer::new(OutputFormat::Plain);
        let cluster = Cluster::new("c1", vec![hmc_types::Host::new("h1", ["NAMENODE"])]);
        let text = renderer.to_text(&Output::Cluster(cluster)).unwrap();
        assert!(text.starts_with("c1"));
        assert!(text.contains("REGISTERED"));
        assert!(text.contains("NAMENODE"));
    }
}
