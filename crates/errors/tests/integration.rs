//! Integration tests for error types

#[cfg(test)]
mod tests {
    use hmc_errors::*;

    #[test]
    fn test_error_conversion() {
        let state_err = StateError::Conflict {
            cluster: "c1".into(),
            active_txn_id: "4".into(),
        };
        let err: Error = state_err.into();
        assert!(matches!(err, Error::State(_)));
        assert!(err.is_conflict());
    }

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::ClusterNotFound {
            cluster: "c9".into(),
        };
        assert_eq!(err.to_string(), "cluster not found: c9");
    }

    #[test]
    fn test_storage_errors_are_retryable_but_conflicts_are_not() {
        let storage: Error = StateError::DatabaseError {
            message: "database is locked".into(),
        }
        .into();
        let conflict: Error = StateError::Conflict {
            cluster: "c1".into(),
            active_txn_id: "1".into(),
        }
        .into();

        assert!(storage.is_retryable());
        assert_eq!(storage.code(), ErrorCode::Storage);
        assert!(!conflict.is_retryable());
        assert_ne!(storage.code().as_i32(), conflict.code().as_i32());
    }

    #[test]
    fn test_result_codes_never_zero() {
        let codes = [
            ErrorCode::Internal,
            ErrorCode::ClusterNotFound,
            ErrorCode::UnknownOperation,
            ErrorCode::InvalidOptions,
            ErrorCode::Conflict,
            ErrorCode::Storage,
            ErrorCode::TransactionNotFound,
            ErrorCode::InvalidTransition,
            ErrorCode::InvalidConfig,
        ];
        for code in codes {
            assert_ne!(code.as_i32(), 0, "{code} must not collide with success");
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "test");
        let err: Error = io_err.into();
        assert!(matches!(
            err,
            Error::Io {
                kind: std::io::ErrorKind::PermissionDenied,
                ..
            }
        ));
        assert_eq!(err.user_code(), Some("error.io"));
    }
}
