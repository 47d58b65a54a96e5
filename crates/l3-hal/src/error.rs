//! Backend status codes and errors.

use std::fmt;
use thiserror::Error;

/// Status codes a vendor backend reports.
///
/// Raw values follow the usual switch SDK convention of zero for success and
/// negative codes for failures, so a backend wrapping a C SDK can convert with
/// [`HalStatus::from_raw`].
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HalStatus {
    Success = 0,
    Failure = -1,
    NotSupported = -2,
    NoMemory = -3,
    InsufficientResources = -4,
    InvalidParameter = -5,
    ItemAlreadyExists = -6,
    ItemNotFound = -7,
    TableFull = -13,
    ObjectInUse = -17,
    InvalidObjectId = -19,
    Timeout = -30,
}

impl HalStatus {
    pub fn from_raw(status: i32) -> Self {
        match status {
            0 => HalStatus::Success,
            -2 => HalStatus::NotSupported,
            -3 => HalStatus::NoMemory,
            -4 => HalStatus::InsufficientResources,
            -5 => HalStatus::InvalidParameter,
            -6 => HalStatus::ItemAlreadyExists,
            -7 => HalStatus::ItemNotFound,
            -13 => HalStatus::TableFull,
            -17 => HalStatus::ObjectInUse,
            -19 => HalStatus::InvalidObjectId,
            -30 => HalStatus::Timeout,
            _ => HalStatus::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == HalStatus::Success
    }

    pub fn into_result(self) -> HalResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(HalError::from_status(self))
        }
    }
}

impl fmt::Display for HalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HalStatus::Success => "SUCCESS",
            HalStatus::Failure => "FAILURE",
            HalStatus::NotSupported => "NOT_SUPPORTED",
            HalStatus::NoMemory => "NO_MEMORY",
            HalStatus::InsufficientResources => "INSUFFICIENT_RESOURCES",
            HalStatus::InvalidParameter => "INVALID_PARAMETER",
            HalStatus::ItemAlreadyExists => "ITEM_ALREADY_EXISTS",
            HalStatus::ItemNotFound => "ITEM_NOT_FOUND",
            HalStatus::TableFull => "TABLE_FULL",
            HalStatus::ObjectInUse => "OBJECT_IN_USE",
            HalStatus::InvalidObjectId => "INVALID_OBJECT_ID",
            HalStatus::Timeout => "TIMEOUT",
        };
        f.write_str(s)
    }
}

/// Error returned by a backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HalError {
    #[error("backend call failed: {status}")]
    Status { status: HalStatus },

    #[error("not supported by backend: {feature}")]
    NotSupported { feature: String },

    #[error("invalid parameter: {message}")]
    InvalidParameter { message: String },

    #[error("item not found: {item}")]
    NotFound { item: String },

    #[error("item already exists: {item}")]
    AlreadyExists { item: String },

    #[error("table full: {table}")]
    TableFull { table: String },

    #[error("object in use: {object}")]
    ObjectInUse { object: String },

    #[error("backend call timed out: {operation}")]
    Timeout { operation: String },
}

impl HalError {
    pub fn from_status(status: HalStatus) -> Self {
        let item = || format!("status {}", status);
        match status {
            HalStatus::NotSupported => HalError::NotSupported { feature: item() },
            HalStatus::InvalidParameter | HalStatus::InvalidObjectId => {
                HalError::InvalidParameter { message: item() }
            }
            HalStatus::ItemNotFound => HalError::NotFound { item: item() },
            HalStatus::ItemAlreadyExists => HalError::AlreadyExists { item: item() },
            HalStatus::TableFull => HalError::TableFull { table: item() },
            HalStatus::ObjectInUse => HalError::ObjectInUse { object: item() },
            HalStatus::Timeout => HalError::Timeout { operation: item() },
            _ => HalError::Status { status },
        }
    }

    pub fn not_supported(feature: impl Into<String>) -> Self {
        HalError::NotSupported {
            feature: feature.into(),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        HalError::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn not_found(item: impl Into<String>) -> Self {
        HalError::NotFound { item: item.into() }
    }

    pub fn already_exists(item: impl Into<String>) -> Self {
        HalError::AlreadyExists { item: item.into() }
    }

    pub fn table_full(table: impl Into<String>) -> Self {
        HalError::TableFull {
            table: table.into(),
        }
    }

    pub fn object_in_use(object: impl Into<String>) -> Self {
        HalError::ObjectInUse {
            object: object.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        HalError::Timeout {
            operation: operation.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HalError::NotFound { .. })
    }
}

/// Result type for backend calls.
pub type HalResult<T> = Result<T, HalError>;
