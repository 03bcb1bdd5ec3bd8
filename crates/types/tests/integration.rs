//! Integration tests for types

#[cfg(test)]
mod tests {
    use hmc_types::*;
    use proptest::prelude::*;

    fn terminal_status() -> impl Strategy<Value = HostTaskStatus> {
        prop_oneof![
            Just(HostTaskStatus::Succeeded),
            Just(HostTaskStatus::Failed),
            Just(HostTaskStatus::TimedOut),
        ]
    }

    proptest! {
        #[test]
        fn success_iff_every_task_succeeded(statuses in prop::collection::vec(terminal_status(), 1..40)) {
            let status = aggregate_status(statuses.iter().copied()).unwrap();
            let all_ok = statuses.iter().all(|s| *s == HostTaskStatus::Succeeded);
            let none_ok = statuses.iter().all(|s| *s != HostTaskStatus::Succeeded);

            prop_assert_eq!(status == TransactionStatus::Success, all_ok);
            prop_assert_eq!(status == TransactionStatus::Failed, none_ok);
            prop_assert_eq!(status == TransactionStatus::PartialFailure, !all_ok && !none_ok);
        }

        #[test]
        fn any_unresolved_task_keeps_status_open(
            statuses in prop::collection::vec(terminal_status(), 0..20),
            pending in prop_oneof![Just(HostTaskStatus::Queued), Just(HostTaskStatus::Dispatched)],
            at in any::<prop::sample::Index>(),
        ) {
            let mut statuses = statuses;
            let idx = at.index(statuses.len() + 1);
            statuses.insert(idx, pending);
            prop_assert_eq!(aggregate_status(statuses), None);
        }
    }

    #[test]
    fn test_status_strings_round_trip_through_from_str() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::InProgress,
            TransactionStatus::Cancelling,
            TransactionStatus::Success,
            TransactionStatus::Failed,
            TransactionStatus::PartialFailure,
            TransactionStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<TransactionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_remaining_steps_follow_cursor() {
        let task = HostTask {
            txn_id: TxnId(1),
            host: "h1".into(),
            plan: vec![
                HostAction::new(ActionKind::Uninstall, vec![]),
                HostAction::new(ActionKind::PurgeData, vec![]),
            ],
            status: HostTaskStatus::Dispatched,
            attempts: 1,
            steps_completed: 1,
            step_attempts: 0,
            error: None,
            updated_at: chrono::Utc::now(),
        };
        assert_eq!(task.remaining_steps().len(), 1);
        assert_eq!(task.remaining_steps()[0].kind, ActionKind::PurgeData);
    }

    #[test]
    fn test_output_format_default() {
        assert_eq!(OutputFormat::default(), OutputFormat::Json);
    }
}
