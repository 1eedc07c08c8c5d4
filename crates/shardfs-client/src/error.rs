use thiserror::Error;

/// Error taxonomy for the ShardFS client adapter.
///
/// Native status codes are translated into these variants exactly once, at
/// the binding boundary (see [`crate::status`]). Argument validation fails
/// locally before any native call is made.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Required argument missing: {msg}")]
    NullArgument { msg: String },

    #[error("Invalid argument: {msg}")]
    InvalidArgument { msg: String },

    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("Already exists: {path}")]
    AlreadyExists { path: String },

    #[error("Operation not supported: {op}")]
    Unsupported { op: String },

    #[error("Session is not started")]
    SessionNotStarted,

    #[error("Native SDK library not loadable: {path}")]
    MissingLibrary { path: String },

    #[error("Failed to start native session, status code {code}")]
    StartFailed { code: i32 },

    #[error("{op} failed for {path}, status code {code}")]
    Remote { op: String, path: String, code: i64 },
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display_carries_path() {
        let err = StorageError::NotFound {
            path: "/data/missing".to_string(),
        };
        assert!(err.to_string().contains("/data/missing"));
    }

    #[test]
    fn test_remote_display_carries_op_path_and_code() {
        let err = StorageError::Remote {
            op: "rename".to_string(),
            path: "/a".to_string(),
            code: -5,
        };
        let msg = err.to_string();
        assert!(msg.contains("rename"));
        assert!(msg.contains("/a"));
        assert!(msg.contains("-5"));
    }

    #[test]
    fn test_unsupported_display_carries_op() {
        let err = StorageError::Unsupported {
            op: "pread".to_string(),
        };
        assert!(err.to_string().contains("pread"));
    }

    #[test]
    fn test_start_failed_display_carries_code() {
        let err = StorageError::StartFailed { code: -111 };
        assert!(err.to_string().contains("-111"));
    }

    #[test]
    fn test_display_messages_non_empty() {
        let errors = [
            StorageError::NullArgument {
                msg: "path".to_string(),
            },
            StorageError::InvalidArgument {
                msg: "bad".to_string(),
            },
            StorageError::NotFound {
                path: "/x".to_string(),
            },
            StorageError::AlreadyExists {
                path: "/x".to_string(),
            },
            StorageError::Unsupported {
                op: "xattr".to_string(),
            },
            StorageError::SessionNotStarted,
            StorageError::MissingLibrary {
                path: "/lib/none.so".to_string(),
            },
            StorageError::StartFailed { code: -1 },
        ];
        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }
}
