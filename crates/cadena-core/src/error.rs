//! Errors surfaced by filter libraries and descriptors.

use std::fmt;

/// Failure from a filter library or descriptor operation.
#[derive(Debug)]
pub enum FilterError {
    /// The library has no filter with the requested label.
    UnknownLabel(String),
    /// The instance could not be created.
    Instantiate(String),
    /// The node's configuration blob was rejected.
    BadConfig(String),
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownLabel(label) => write!(f, "no filter with label '{label}'"),
            Self::Instantiate(reason) => write!(f, "cannot create instance: {reason}"),
            Self::BadConfig(reason) => write!(f, "invalid filter config: {reason}"),
        }
    }
}

impl std::error::Error for FilterError {}
