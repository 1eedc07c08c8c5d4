//! Native status code translation.
//!
//! The SDK reports results as 0 (OK) or a negative errno-style integer.
//! The mapping into [`StorageError`] is total: codes without a dedicated
//! variant become [`StorageError::Remote`] carrying the raw code.

use crate::error::{Result, StorageError};

pub const STATUS_OK: i64 = 0;
pub const STATUS_NOT_FOUND: i64 = -(libc::ENOENT as i64);
pub const STATUS_EXISTS: i64 = -(libc::EEXIST as i64);
pub const STATUS_INVALID: i64 = -(libc::EINVAL as i64);

/// Translate a negative native status into a typed error.
///
/// `op` and `path` are carried for diagnostics; callers should pass the
/// operation name and the path (or a descriptor label) the call targeted.
pub fn translate(op: &str, path: &str, code: i64) -> StorageError {
    match code {
        STATUS_NOT_FOUND => StorageError::NotFound {
            path: path.to_string(),
        },
        STATUS_EXISTS => StorageError::AlreadyExists {
            path: path.to_string(),
        },
        STATUS_INVALID => StorageError::InvalidArgument {
            msg: format!("{op} rejected by the cluster for {path}"),
        },
        _ => StorageError::Remote {
            op: op.to_string(),
            path: path.to_string(),
            code,
        },
    }
}

/// Check a status-returning native call: non-negative is success.
pub fn check(op: &str, path: &str, code: i64) -> Result<()> {
    if code >= STATUS_OK {
        Ok(())
    } else {
        Err(translate(op, path, code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_passes_check() {
        assert!(check("mkdirs", "/d", 0).is_ok());
    }

    #[test]
    fn test_positive_passes_check() {
        assert!(check("open", "/f", 12).is_ok());
    }

    #[test]
    fn test_enoent_maps_to_not_found() {
        let err = translate("stat", "/gone", STATUS_NOT_FOUND);
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[test]
    fn test_eexist_maps_to_already_exists() {
        let err = translate("mkdirs", "/d", STATUS_EXISTS);
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
    }

    #[test]
    fn test_einval_maps_to_invalid_argument() {
        let err = translate("open", "/f", STATUS_INVALID);
        assert!(matches!(err, StorageError::InvalidArgument { .. }));
    }

    #[test]
    fn test_unknown_code_stays_representable() {
        let err = translate("write", "fd 7", -777);
        match err {
            StorageError::Remote { op, path, code } => {
                assert_eq!(op, "write");
                assert_eq!(path, "fd 7");
                assert_eq!(code, -777);
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[test]
    fn test_check_surfaces_translated_error() {
        let err = check("unlink", "/f", STATUS_NOT_FOUND).unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }
}
