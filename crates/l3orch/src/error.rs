//! Error type shared by every manager.

use l3_hal::HalError;
use l3_orch_common::ObjectTableError;
use std::fmt;
use thiserror::Error;

/// The closed set of failure classes a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    ResourceInUse,
    Unresolved,
    Unsupported,
    BackendFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::ResourceInUse => "resource_in_use",
            ErrorKind::Unresolved => "unresolved",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::BackendFailure => "backend_failure",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum L3Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("resource in use: {0}")]
    ResourceInUse(String),

    #[error("unresolved: {0}")]
    Unresolved(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The hardware call failed. In-memory state is as it was before the
    /// call unless the operation documents otherwise.
    #[error("backend failure: {0}")]
    Backend(HalError),
}

impl L3Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        L3Error::InvalidArgument(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        L3Error::NotFound(what.into())
    }

    pub fn in_use(what: impl Into<String>) -> Self {
        L3Error::ResourceInUse(what.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            L3Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            L3Error::NotFound(_) => ErrorKind::NotFound,
            L3Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            L3Error::ResourceInUse(_) => ErrorKind::ResourceInUse,
            L3Error::Unresolved(_) => ErrorKind::Unresolved,
            L3Error::Unsupported(_) => ErrorKind::Unsupported,
            L3Error::Backend(_) => ErrorKind::BackendFailure,
        }
    }
}

impl From<HalError> for L3Error {
    fn from(e: HalError) -> Self {
        match e {
            HalError::NotSupported { feature } => L3Error::Unsupported(feature),
            other => L3Error::Backend(other),
        }
    }
}

impl From<ObjectTableError> for L3Error {
    fn from(e: ObjectTableError) -> Self {
        match e {
            ObjectTableError::NotFound { .. } => L3Error::NotFound(e.to_string()),
            ObjectTableError::AlreadyExists { .. } => L3Error::AlreadyExists(e.to_string()),
            ObjectTableError::InUse { .. } => L3Error::ResourceInUse(e.to_string()),
        }
    }
}

pub type L3Result<T> = Result<T, L3Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_backend_errors_map_to_backend_failure() {
        let err: L3Error = HalError::table_full("next-hop group").into();
        assert_eq!(err.kind(), ErrorKind::BackendFailure);

        let err: L3Error = HalError::timeout("create_route").into();
        assert_eq!(err.kind(), ErrorKind::BackendFailure);
    }

    #[test]
    fn test_not_supported_maps_to_unsupported() {
        let err: L3Error = HalError::not_supported("resilient hash").into();
        assert_eq!(err, L3Error::Unsupported("resilient hash".to_string()));
    }

    #[test]
    fn test_table_errors() {
        let err: L3Error = ObjectTableError::InUse {
            table: "next-hop",
            key: "0x10".to_string(),
            ref_count: 2,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::ResourceInUse);
        assert!(err.to_string().contains("ref_count=2"));

        let err: L3Error = ObjectTableError::NotFound {
            table: "route",
            key: "x".to_string(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
