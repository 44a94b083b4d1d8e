//! URS error types.

use thiserror::Error;
use urs_types::{HandleId, MailboxId, OpKind, Status};

use crate::transport::TransportError;

/// URS error type.
#[derive(Debug, Error)]
pub enum UrsError {
    /// The provider's capability slot for this operation is empty.
    #[error("{op} not supported by mount {mount}")]
    Unsupported { op: OpKind, mount: String },

    /// Corrupt capability record or a reply that does not match the
    /// operation's layout.
    #[error("internal dispatch error: {0}")]
    InternalDispatch(String),

    /// No registered prefix covers the path.
    #[error("no mount for path: {0}")]
    NoSuchMount(String),

    /// A component lookup produced no node.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// Unknown, stale, or closing handle.
    #[error("bad handle: {0}")]
    BadHandle(HandleId),

    /// A super already covers this exact path.
    #[error("already mounted: {0}")]
    AlreadyMounted(String),

    /// Unregister refused while references are outstanding.
    #[error("mount busy: {path} ({refs} references)")]
    MountBusy { path: String, refs: usize },

    /// The provider answered with a nonzero status.
    #[error("{op} failed: {status}")]
    Provider { op: OpKind, status: Status },

    /// The request never got a well-formed answer.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// The remote reply deadline expired.
    #[error("provider at {mailbox} unresponsive during {op}")]
    ProviderUnresponsive { mailbox: MailboxId, op: OpKind },

    /// Empty path or unusable link target.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Link chain deeper than the configured limit.
    #[error("too many symbolic links: {0}")]
    TooManyLinks(String),

    /// Link target larger than the inline link buffer.
    #[error("link target too long ({0} bytes)")]
    NameTooLong(usize),
}

impl UrsError {
    /// Create an Unsupported error.
    pub fn unsupported(op: OpKind, mount: impl Into<String>) -> Self {
        Self::Unsupported {
            op,
            mount: mount.into(),
        }
    }

    /// Create an InternalDispatch error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalDispatch(msg.into())
    }

    /// Create a NoSuchMount error.
    pub fn no_such_mount(path: impl Into<String>) -> Self {
        Self::NoSuchMount(path.into())
    }

    /// Create a PathNotFound error.
    pub fn path_not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Check if this is a resolution failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, UrsError::NoSuchMount(_) | UrsError::PathNotFound(_))
    }

    /// Negative integer for the raw ABI. `0` is never returned.
    ///
    /// Provider statuses pass through negated so callers see the code the
    /// provider chose.
    pub fn errno(&self) -> i32 {
        match self {
            UrsError::Unsupported { .. } => -Status::NOT_SUPPORTED.0,
            UrsError::InternalDispatch(_) => -Status::IO.0,
            UrsError::NoSuchMount(_) | UrsError::PathNotFound(_) => -Status::NOT_FOUND.0,
            UrsError::BadHandle(_) => -Status::BAD_HANDLE.0,
            UrsError::AlreadyMounted(_) => -Status::EXISTS.0,
            UrsError::MountBusy { .. } => -Status::BUSY.0,
            UrsError::Provider { status, .. } if status.0 > 0 => -status.0,
            UrsError::Provider { status, .. } if status.0 < 0 => status.0,
            UrsError::Provider { .. } => -Status::IO.0,
            UrsError::Transport(_) => -Status::IO.0,
            UrsError::ProviderUnresponsive { .. } => -Status::TIMED_OUT.0,
            UrsError::InvalidPath(_) => -Status::INVALID.0,
            UrsError::TooManyLinks(_) => -Status::TOO_MANY_LINKS.0,
            UrsError::NameTooLong(_) => -Status::NAME_TOO_LONG.0,
        }
    }
}

/// URS result type.
pub type UrsResult<T> = Result<T, UrsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_is_never_zero() {
        let errors = [
            UrsError::unsupported(OpKind::Read, "vfs://dev/"),
            UrsError::internal("bad tag"),
            UrsError::no_such_mount("vfs://x"),
            UrsError::path_not_found("vfs://x/y"),
            UrsError::BadHandle(HandleId::new(1, 1)),
            UrsError::AlreadyMounted("vfs://x/".into()),
            UrsError::MountBusy {
                path: "vfs://x/".into(),
                refs: 3,
            },
            UrsError::Provider {
                op: OpKind::Write,
                status: Status::OK,
            },
            UrsError::invalid_path(""),
            UrsError::TooManyLinks("vfs://loop".into()),
            UrsError::NameTooLong(300),
        ];
        for err in &errors {
            assert!(err.errno() < 0, "{err} mapped to {}", err.errno());
        }
    }

    #[test]
    fn test_provider_status_passes_through() {
        let err = UrsError::Provider {
            op: OpKind::Open,
            status: Status::NOT_PERMITTED,
        };
        assert_eq!(err.errno(), -1);
        assert_eq!(err.to_string(), "open failed: not permitted (1)");
    }

    #[test]
    fn test_unresponsive_maps_to_timed_out() {
        let err = UrsError::ProviderUnresponsive {
            mailbox: MailboxId(4),
            op: OpKind::Read,
        };
        assert_eq!(err.errno(), -Status::TIMED_OUT.0);
        assert_eq!(err.errno(), -110);
    }

    #[test]
    fn test_not_found_covers_resolution_failures() {
        assert!(UrsError::no_such_mount("a").is_not_found());
        assert!(UrsError::path_not_found("a").is_not_found());
        assert!(!UrsError::BadHandle(HandleId::new(0, 0)).is_not_found());
    }
}
