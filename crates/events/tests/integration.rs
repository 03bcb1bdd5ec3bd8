//! Integration tests for events

#[cfg(test)]
mod tests {
    use hmc_events::*;
    use hmc_types::{TransactionStatus, TxnId};
    use std::time::Duration;

    #[tokio::test]
    async fn test_event_emitter() {
        let (tx, mut rx) = channel();

        tx.emit_warning("test warning");
        tx.emit_debug("test debug");

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(
            event1,
            AppEvent::General(GeneralEvent::Warning { .. })
        ));

        let event2 = rx.recv().await.unwrap();
        assert!(matches!(
            event2,
            AppEvent::General(GeneralEvent::DebugLog { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_receiver() {
        let (tx, rx) = channel();
        drop(rx);

        // Should not panic when receiver is dropped
        tx.emit_warning("ignored");
    }

    #[test]
    fn test_absent_sender_is_silent() {
        let sender: Option<EventSender> = None;
        sender.emit_debug("nobody listens");
    }

    #[test]
    fn test_log_levels() {
        let failed = AppEvent::HostTask(HostTaskEvent::Failed {
            txn_id: TxnId(1),
            host: "h1".into(),
            error: "agent exited with 4".into(),
        });
        assert_eq!(failed.log_level(), tracing::Level::ERROR);

        let partial = AppEvent::Transaction(TransactionEvent::Completed {
            txn_id: TxnId(1),
            status: TransactionStatus::PartialFailure,
            duration: Duration::from_secs(3),
        });
        assert_eq!(partial.log_level(), tracing::Level::WARN);
        assert_eq!(partial.log_target(), "hmc::events::transaction");
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = AppEvent::Transaction(TransactionEvent::Started { txn_id: TxnId(9) });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["domain"], "transaction");
        assert_eq!(json["event"]["type"], "Started");
        assert_eq!(json["event"]["txn_id"], "9");
    }
}
