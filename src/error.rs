use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of an [`IpamError`], stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    AlreadyExists,
    NotFound,
    ResourceExhausted,
    Corrupt,
    LockFailure,
    Io,
}

#[derive(Debug, Error)]
pub enum IpamError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `what` is the kind of entity, e.g. `network` or `port`.
    #[error("{what} '{id}' already exists")]
    AlreadyExists { what: &'static str, id: String },

    #[error("{what} '{id}' not found")]
    NotFound { what: &'static str, id: String },

    #[error("no free {what} left in '{id}'")]
    ResourceExhausted { what: &'static str, id: String },

    #[error("record {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to lock {}", .path.display())]
    LockFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error on {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl IpamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IpamError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            IpamError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            IpamError::NotFound { .. } => ErrorKind::NotFound,
            IpamError::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            IpamError::Corrupt { .. } => ErrorKind::Corrupt,
            IpamError::LockFailure { .. } => ErrorKind::LockFailure,
            IpamError::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn not_found(what: &'static str, id: &str) -> Self {
        IpamError::NotFound {
            what,
            id: id.to_string(),
        }
    }

    pub(crate) fn already_exists(what: &'static str, id: &str) -> Self {
        IpamError::AlreadyExists {
            what,
            id: id.to_string(),
        }
    }

    pub(crate) fn exhausted(what: &'static str, id: &str) -> Self {
        IpamError::ResourceExhausted {
            what,
            id: id.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        IpamError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, IpamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_entity() {
        let err = IpamError::not_found("address", "web-1");
        assert_eq!(err.to_string(), "address 'web-1' not found");
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = IpamError::exhausted("port", "edge");
        assert_eq!(err.to_string(), "no free port left in 'edge'");
        assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    }
}
