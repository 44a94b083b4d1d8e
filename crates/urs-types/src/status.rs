//! Provider status codes.
//!
//! A provider answers every operation with an integer status: `0` for
//! success, a positive errno-style code otherwise. Local providers return it
//! as the `Err` side of their result, remote providers as the last reply
//! parameter. The core propagates it unchanged inside its own error type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Integer result code reported by a provider.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(pub i32);

impl Status {
    pub const OK: Status = Status(0);
    pub const NOT_PERMITTED: Status = Status(1);
    pub const NOT_FOUND: Status = Status(2);
    pub const IO: Status = Status(5);
    pub const BAD_HANDLE: Status = Status(9);
    pub const BUSY: Status = Status(16);
    pub const EXISTS: Status = Status(17);
    pub const CROSS_DEVICE: Status = Status(18);
    pub const NOT_A_DIRECTORY: Status = Status(20);
    pub const IS_A_DIRECTORY: Status = Status(21);
    pub const INVALID: Status = Status(22);
    pub const NAME_TOO_LONG: Status = Status(36);
    pub const NOT_SUPPORTED: Status = Status(38);
    pub const NOT_EMPTY: Status = Status(39);
    pub const TOO_MANY_LINKS: Status = Status(40);
    pub const TIMED_OUT: Status = Status(110);

    pub fn is_ok(&self) -> bool {
        self.0 == 0
    }

    /// Symbolic name for logs, if the code is one of the named constants.
    pub fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Status::OK => "ok",
            Status::NOT_PERMITTED => "not permitted",
            Status::NOT_FOUND => "not found",
            Status::IO => "i/o error",
            Status::BAD_HANDLE => "bad handle",
            Status::BUSY => "busy",
            Status::EXISTS => "exists",
            Status::CROSS_DEVICE => "cross-device link",
            Status::NOT_A_DIRECTORY => "not a directory",
            Status::IS_A_DIRECTORY => "is a directory",
            Status::INVALID => "invalid argument",
            Status::NAME_TOO_LONG => "name too long",
            Status::NOT_SUPPORTED => "not supported",
            Status::NOT_EMPTY => "directory not empty",
            Status::TOO_MANY_LINKS => "too many links",
            Status::TIMED_OUT => "timed out",
            _ => return None,
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "status {}", self.0),
        }
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status({})", self.0)
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, Status>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_names() {
        assert_eq!(Status::NOT_FOUND.to_string(), "not found (2)");
        assert_eq!(Status::TIMED_OUT.to_string(), "timed out (110)");
        assert_eq!(Status(1234).to_string(), "status 1234");
    }

    #[test]
    fn test_ok_is_zero() {
        assert!(Status::OK.is_ok());
        assert!(!Status::IO.is_ok());
    }
}
