use proptest::prelude::*;
use sdk::errors::{BoardError, BoardErrorExt};
use sdk::types::{BatchResult, PlacedItem};

// Every error variant yields a non-empty, static hint that never echoes the
// message it was built from.
proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "[a-zA-Z0-9 ]{8,40}") {
        let errs = vec![
            BoardError::Config(error_str.clone()),
            BoardError::MissingCredential(error_str.clone()),
            BoardError::from_status(401, error_str.clone()),
            BoardError::from_status(429, error_str.clone()),
            BoardError::from_status(500, error_str.clone()),
            BoardError::Validation(error_str.clone()),
            BoardError::Protocol(error_str.clone()),
            BoardError::Tool(error_str.clone()),
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains(&error_str));
        }
    }
}

// Only 401 and 403 are auth failures.
proptest! {
    #[test]
    fn test_only_401_403_are_auth(status in 400u16..600) {
        let err = BoardError::from_status(status, "x");
        prop_assert_eq!(err.is_auth_failure(), status == 401 || status == 403);
        prop_assert_eq!(err.http_status(), Some(status));
    }
}

// Batch bookkeeping keeps ok + failed equal to the number of recorded items.
proptest! {
    #[test]
    fn test_batch_result_counts(outcomes in proptest::collection::vec(any::<bool>(), 0..50)) {
        let mut result = BatchResult::default();
        for (i, ok) in outcomes.iter().enumerate() {
            if *ok {
                result.record_created(format!("id-{}", i));
            } else {
                let item = PlacedItem {
                    content: format!("item {}", i),
                    x: 0.0,
                    y: 0.0,
                    width: 200.0,
                    remote_id: None,
                    container_id: None,
                };
                result.record_failed(i, item, "failed");
            }
        }

        prop_assert_eq!(result.ok + result.failed.len(), outcomes.len());
        prop_assert_eq!(result.ok, result.created.len());
    }
}
