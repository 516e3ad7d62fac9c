//! Status codes returned by storage operations.
//!
//! The set is closed: the protocol layer maps each variant 1:1 onto a
//! response code without needing to know the internal cause.

use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

/// Outcome of a storage operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, IntoStaticStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageStatus {
    #[default]
    Ok,
    /// The access-control collaborator denied the action.
    ErrNoUacPerm,
    ErrNoSuchFile,
    ErrNoSuchDir,
    ErrNoSuchEndpoint,
    ErrInvalidFileName,
    /// A sibling with the same name already exists.
    ErrNoUniqueName,
    /// The change would exceed a directory quota somewhere up the tree.
    ErrQuotaExceeded,
    /// Resource exhaustion or in-flight usage; retry after backoff.
    ErrBusy,
    ErrUnsuccessful,
}

impl StorageStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, StorageStatus::Ok)
    }

    /// Stable machine-readable code, e.g. `ERR_NO_SUCH_FILE`.
    pub fn code(&self) -> &'static str {
        self.into()
    }

    /// Human-readable description for responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageStatus::Ok => "Success",
            StorageStatus::ErrNoUacPerm => "Insufficient permissions",
            StorageStatus::ErrNoSuchFile => "No such file",
            StorageStatus::ErrNoSuchDir => "No such directory",
            StorageStatus::ErrNoSuchEndpoint => "No such storage endpoint",
            StorageStatus::ErrInvalidFileName => "Invalid file name",
            StorageStatus::ErrNoUniqueName => "Name already exists",
            StorageStatus::ErrQuotaExceeded => "Not enough space",
            StorageStatus::ErrBusy => "Resource busy - try again later",
            StorageStatus::ErrUnsuccessful => "Operation failed",
        }
    }
}

impl std::fmt::Display for StorageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(StorageStatus::Ok.code(), "OK");
        assert_eq!(StorageStatus::ErrNoUacPerm.code(), "ERR_NO_UAC_PERM");
        assert_eq!(StorageStatus::ErrNoSuchDir.code(), "ERR_NO_SUCH_DIR");
    }

    #[test]
    fn test_serialized_as_code() {
        let json = serde_json::to_string(&StorageStatus::ErrNoUniqueName).unwrap();
        assert_eq!(json, "\"ERR_NO_UNIQUE_NAME\"");
    }

    #[test]
    fn test_default_is_ok() {
        assert!(StorageStatus::default().is_ok());
        assert!(!StorageStatus::ErrBusy.is_ok());
        assert_eq!(StorageStatus::ErrBusy.to_string(), "Resource busy - try again later");
    }
}
