//! Typed identifiers for endpoints, users, and files.
//!
//! Endpoint and user ids are small integers assigned by the surrounding
//! system. A [`FileId`] names one entry (file or directory) inside one
//! storage endpoint; its `uid` is also the numeric name of the entry's
//! backing object in the endpoint's datastore.
//!
//! `FileId` has two lossless encodings: a packed `u64` for compact storage
//! and a `<endpoint>:<uid>:<d|f>` string for the protocol layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A storage endpoint identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(u16);

/// A user identifier, as issued by the authentication layer.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u32);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_numeric_id {
    ($T:ident, $raw:ty, $name:literal) => {
        impl $T {
            /// Wrap a raw id.
            pub const fn new(raw: $raw) -> Self {
                Self(raw)
            }

            /// The raw numeric value.
            pub const fn get(self) -> $raw {
                self.0
            }
        }

        impl From<$raw> for $T {
            fn from(raw: $raw) -> Self {
                Self(raw)
            }
        }

        impl From<$T> for $raw {
            fn from(id: $T) -> $raw {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.0)
            }
        }
    };
}

impl_numeric_id!(EndpointId, u16, "EndpointId");
impl_numeric_id!(UserId, u32, "UserId");

impl EndpointId {
    /// Sentinel for "no endpoint".
    pub const INVALID: Self = Self(u16::MAX);
}

impl UserId {
    /// Sentinel for "no user" (e.g. unknown creator).
    pub const INVALID: Self = Self(u32::MAX);

    /// Returns true unless this is the sentinel.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

// ── FileId ──────────────────────────────────────────────────────────────────

const DIRECTORY_BIT: u64 = 1 << 48;

/// Identifies one file or directory inside one endpoint.
///
/// Immutable once issued. Comparison is by value.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct FileId {
    endpoint: EndpointId,
    uid: u32,
    is_directory: bool,
}

impl FileId {
    /// Sentinel for "no file".
    pub const INVALID: Self = Self {
        endpoint: EndpointId::INVALID,
        uid: u32::MAX,
        is_directory: false,
    };

    /// Id of a regular file.
    pub const fn file(endpoint: EndpointId, uid: u32) -> Self {
        Self {
            endpoint,
            uid,
            is_directory: false,
        }
    }

    /// Id of a directory.
    pub const fn directory(endpoint: EndpointId, uid: u32) -> Self {
        Self {
            endpoint,
            uid,
            is_directory: true,
        }
    }

    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }

    /// The endpoint-unique number; doubles as the backing object name.
    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn is_file(&self) -> bool {
        !self.is_directory
    }

    /// Returns true unless the uid is the sentinel value.
    pub fn is_valid(&self) -> bool {
        self.uid != u32::MAX && self.endpoint != EndpointId::INVALID
    }

    /// Pack into a `u64`: uid in the low 32 bits, endpoint in the next 16,
    /// directory flag above that.
    pub fn to_u64(self) -> u64 {
        let mut num = u64::from(self.uid) | (u64::from(self.endpoint.get()) << 32);
        if self.is_directory {
            num |= DIRECTORY_BIT;
        }
        num
    }

    /// Inverse of [`FileId::to_u64`]. Bits above the directory flag are ignored.
    pub fn from_u64(num: u64) -> Self {
        Self {
            endpoint: EndpointId::new(((num >> 32) & 0xFFFF) as u16),
            uid: (num & 0xFFFF_FFFF) as u32,
            is_directory: num & DIRECTORY_BIT != 0,
        }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_directory { 'd' } else { 'f' };
        write!(f, "{}:{}:{}", self.endpoint, self.uid, kind)
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({self})")
    }
}

/// Error from parsing a [`FileId`] string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    #[error("expected <endpoint>:<uid>:<d|f>, got '{0}'")]
    Malformed(String),
    #[error("invalid number in '{0}'")]
    Number(String),
    #[error("unknown entry kind '{0}'")]
    Kind(String),
}

impl FromStr for FileId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(endpoint), Some(uid), Some(kind), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(IdParseError::Malformed(s.to_string()));
        };

        let endpoint: u16 = endpoint
            .parse()
            .map_err(|_| IdParseError::Number(s.to_string()))?;
        let uid: u32 = uid.parse().map_err(|_| IdParseError::Number(s.to_string()))?;

        match kind {
            "d" => Ok(Self::directory(EndpointId::new(endpoint), uid)),
            "f" => Ok(Self::file(EndpointId::new(endpoint), uid)),
            other => Err(IdParseError::Kind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_packing() {
        let file = FileId::file(EndpointId::new(7), 42);
        assert_eq!(FileId::from_u64(file.to_u64()), file);

        let dir = FileId::directory(EndpointId::new(u16::MAX - 1), u32::MAX - 1);
        let back = FileId::from_u64(dir.to_u64());
        assert_eq!(back, dir);
        assert!(back.is_directory());
    }

    #[test]
    fn test_directory_bit_distinguishes() {
        let endpoint = EndpointId::new(1);
        assert_ne!(
            FileId::file(endpoint, 3).to_u64(),
            FileId::directory(endpoint, 3).to_u64()
        );
        assert_ne!(FileId::file(endpoint, 3), FileId::directory(endpoint, 3));
    }

    #[test]
    fn test_display_and_parse() {
        let id = FileId::directory(EndpointId::new(2), 19);
        assert_eq!(id.to_string(), "2:19:d");
        assert_eq!("2:19:d".parse::<FileId>().unwrap(), id);
        assert_eq!("2:19:f".parse::<FileId>().unwrap(), FileId::file(EndpointId::new(2), 19));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!("2:19".parse::<FileId>(), Err(IdParseError::Malformed(_))));
        assert!(matches!("2:19:d:x".parse::<FileId>(), Err(IdParseError::Malformed(_))));
        assert!(matches!("x:19:d".parse::<FileId>(), Err(IdParseError::Number(_))));
        assert!(matches!("70000:19:d".parse::<FileId>(), Err(IdParseError::Number(_))));
        assert!(matches!("2:19:q".parse::<FileId>(), Err(IdParseError::Kind(_))));
    }

    #[test]
    fn test_validity() {
        assert!(!FileId::INVALID.is_valid());
        assert!(FileId::file(EndpointId::new(0), 1).is_valid());
        assert!(!UserId::INVALID.is_valid());
        assert!(UserId::new(5).is_valid());
    }

    #[test]
    fn test_serde_transparent_ids() {
        let json = serde_json::to_string(&UserId::new(12)).unwrap();
        assert_eq!(json, "12");
        let back: EndpointId = serde_json::from_str("3").unwrap();
        assert_eq!(back, EndpointId::new(3));
    }
}
