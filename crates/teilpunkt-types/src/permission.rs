//! Permission flags consulted by the access-control collaborator.

use serde::{Deserialize, Serialize};
use strum::{EnumString, IntoStaticStr};

/// The capability an actor needs on a target entry.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Permission {
    /// Read file contents, list a directory, query metadata.
    Read,
    /// Replace file contents, rename.
    Write,
    /// Create entries inside a directory.
    Create,
    /// Remove entries.
    Delete,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
