use thiserror::Error;

use crate::{dbr::DbrType, messages::ErrorCondition};

/// Failures reported by a [`Channel`](crate::channel::Channel) implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("{condition}: {message}")]
    Status {
        condition: ErrorCondition,
        message: String,
    },
    #[error("The channel is not connected")]
    NotConnected,
    #[error("The channel has been destroyed")]
    Destroyed,
}

impl From<ErrorCondition> for TransportError {
    fn from(condition: ErrorCondition) -> Self {
        TransportError::Status {
            condition,
            message: condition.to_string(),
        }
    }
}

/// Failures turning application values into something a channel accepts
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    #[error("Cannot write {0} value: outside the range of a 32-bit signed integer")]
    LongOutOfRange(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PvError {
    #[error("{0}")]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Convert(#[from] ConvertError),
    #[error("The PV has been closed")]
    Closed,
    #[error("Timed out waiting for {0} to connect")]
    Timeout(String),
    #[error("The transport abandoned the request")]
    Abandoned,
    #[error("Native type {0} has no time-stamped variant")]
    NoTimeType(DbrType),
}

pub type Result<T, E = PvError> = std::result::Result<T, E>;
