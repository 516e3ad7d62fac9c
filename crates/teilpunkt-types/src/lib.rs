//! # teilpunkt-types
//!
//! Shared value types for the teilpunkt storage engine.
//!
//! - [`ids`]: typed identifiers for endpoints, files and users
//! - [`status`]: the closed status set returned by storage operations
//! - [`permission`]: permission flags consulted by access control

pub mod ids;
pub mod permission;
pub mod status;

pub use ids::{EndpointId, FileId, IdParseError, UserId};
pub use permission::Permission;
pub use status::StorageStatus;
