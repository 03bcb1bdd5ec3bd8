//! Request glue: turn command arguments into façade calls and wire envelopes

use hmc_types::{AcceptResponse, TxnId, UninstallResponse};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::error::CliError;

/// Message returned when an accepted uninstall carries no transaction id
pub const MISSING_TXN_INFO: &str = "Could not obtain txn info for triggered command";

/// Build the uninstall endpoint envelope.
///
/// A rejected request is passed through unchanged. An accepted one must
/// carry a txn id; without it the caller cannot track anything.
pub fn uninstall_envelope(
    response: &AcceptResponse,
    cluster: &str,
    deploy_user: &str,
    start_time: i64,
) -> Result<Value, CliError> {
    if !response.is_ok() {
        return Ok(serde_json::to_value(response)?);
    }

    let Some(txn_id) = response.txn_id else {
        return Ok(json!({ "result": 1, "error": MISSING_TXN_INFO }));
    };

    let body = UninstallResponse {
        start_time,
        cluster_name: cluster.to_string(),
        deploy_user: deploy_user.to_string(),
        txn_id,
    };
    Ok(json!({ "result": 0, "error": 0, "response": body }))
}

/// Parse repeated `KEY=VALUE` arguments into a loosely-typed option map.
///
/// Values that parse as JSON keep their type (`true`, `3`); anything else
/// is passed on as a string and validated by the orchestrator.
pub fn parse_options(raw: &[String]) -> Result<BTreeMap<String, Value>, CliError> {
    raw.iter()
        .map(|pair| {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                CliError::InvalidArguments(format!("option '{pair}' is not KEY=VALUE"))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(CliError::InvalidArguments(format!(
                    "option '{pair}' has an empty key"
                )));
            }
            let value = serde_json::from_str(value.trim())
                .unwrap_or_else(|_| Value::String(value.to_string()));
            Ok((key.to_string(), value))
        })
        .collect()
}

pub fn parse_txn_id(raw: &str) -> Result<TxnId, CliError> {
    raw.parse()
        .map_err(|_| CliError::InvalidArguments(format!("'{raw}' is not a transaction id")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_uninstall_envelope() {
        let response = AcceptResponse::accepted(TxnId(17));
        let envelope = uninstall_envelope(&response, "c1", "hdp", 1_700_000_000).unwrap();
        assert_eq!(
            envelope,
            json!({
                "result": 0,
                "error": 0,
                "response": {
                    "startTime": 1_700_000_000,
                    "clusterName": "c1",
                    "deployUser": "hdp",
                    "txnId": "17"
                }
            })
        );
    }

    #[test]
    fn rejected_uninstall_is_passed_through() {
        let response = AcceptResponse {
            result: 5,
            txn_id: None,
            error: Some("cluster c1 already has an active transaction 4".to_string()),
        };
        let envelope = uninstall_envelope(&response, "c1", "hdp", 0).unwrap();
        assert_eq!(envelope, serde_json::to_value(&response).unwrap());
    }

    #[test]
    fn accepted_without_txn_id_is_an_error() {
        let envelope = uninstall_envelope(&AcceptResponse::no_op(), "c1", "hdp", 0).unwrap();
        assert_eq!(
            envelope,
            json!({ "result": 1, "error": "Could not obtain txn info for triggered command" })
        );
    }

    #[test]
    fn options_keep_json_types() {
        let options = parse_options(&[
            "wipeout=true".to_string(),
            "note=hello world".to_string(),
        ])
        .unwrap();
        assert_eq!(options["wipeout"], json!(true));
        assert_eq!(options["note"], json!("hello world"));

        assert!(parse_options(&["wipeout".to_string()]).is_err());
        assert!(parse_options(&["=true".to_string()]).is_err());
    }

    #[test]
    fn txn_ids_must_be_numeric() {
        assert_eq!(parse_txn_id(" 42 ").unwrap(), TxnId(42));
        assert!(parse_txn_id("abc").is_err());
    }
}
