use thiserror::Error;

use crate::callback::Payload;

/// Errors surfaced by registration, dispatch and invocation.
///
/// Dispatch misses are never errors: they are reported through
/// [`Outcome::Unhandled`](crate::callback::Outcome) instead.
#[derive(Debug, Clone, Error)]
pub enum MediatorError {
    #[error("incomplete {kind} definition: {reason}")]
    IncompleteDefinition { kind: &'static str, reason: String },

    #[error("{0} is not a declared protocol")]
    InvalidProtocol(&'static str),

    #[error("invalid pattern constraint: {0}")]
    InvalidPattern(String),

    #[error("member name must not be empty")]
    EmptyMemberName,

    #[error("policy property '{0}' is already registered")]
    DuplicatePolicy(String),

    #[error("policy property '{0}' is not registered")]
    UnknownPolicy(String),

    #[error("policy property '{name}' expects {expected}")]
    PolicyMismatch { name: String, expected: &'static str },

    #[error("missing bindings for callbacks: {0:?}")]
    MissingBindings(Vec<String>),

    #[error("callback {callback:?} was rejected")]
    Rejected { callback: Payload },

    #[error("{message}")]
    Timeout { callback: Payload, message: String },

    #[error("{target} has no member '{member}'")]
    NotHandled { target: String, member: String },

    #[error("callback {0:?} has no result slot")]
    MissingResultSlot(Payload),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Failed(String),
}

impl MediatorError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// The callback carried by rejection and timeout errors.
    pub fn callback(&self) -> Option<&Payload> {
        match self {
            Self::Rejected { callback } | Self::Timeout { callback, .. } => Some(callback),
            Self::MissingResultSlot(callback) => Some(callback),
            _ => None,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T, E = MediatorError> = std::result::Result<T, E>;
