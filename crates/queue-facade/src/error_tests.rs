//! Tests for error types.

use super::*;

#[test]
fn test_error_transience() {
    assert!(QueueError::Connection {
        message: "network error".to_string(),
    }
    .is_transient());

    assert!(QueueError::Throttled {
        code: "RequestThrottled".to_string(),
        message: "slow down".to_string(),
    }
    .is_transient());

    assert!(!QueueError::ServiceNotRunning.is_transient());

    assert!(!QueueError::Authentication {
        message: "bad signature".to_string(),
    }
    .is_transient());
}

#[test]
fn test_local_errors_are_distinguished_from_remote_errors() {
    assert!(QueueError::ServiceNotRunning.is_local());
    assert!(QueueError::QueueNotFound {
        queue_url: "http://localhost:9324/queue/missing".to_string(),
    }
    .is_local());

    assert!(!QueueError::Provider {
        code: "InternalError".to_string(),
        message: "boom".to_string(),
    }
    .is_local());
}

#[test]
fn test_queue_not_found_message_names_the_queue() {
    let err = QueueError::QueueNotFound {
        queue_url: "http://localhost:9324/queue/missing".to_string(),
    };
    let text = err.to_string();

    assert!(text.contains("queue"));
    assert!(text.contains("not found"));
    assert!(text.contains("http://localhost:9324/queue/missing"));
}

#[test]
fn test_invalid_configuration_helper() {
    let err = QueueError::invalid_configuration("bad prefix");
    assert!(matches!(err, QueueError::InvalidConfiguration { ref message } if message == "bad prefix"));
}
