//! Error taxonomy for a single command.
//!
//! The `Display` text of every variant is exactly the `message` field sent
//! back to the client in an error response.

/// The line could not be turned into a command envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Can't parse this json data. Please, try again")]
    Unparseable,
    #[error("Can't find valid field method_name in your response. Please, try again")]
    MissingMethod,
    #[error("Unknown method name")]
    UnknownMethod(String),
    #[error("Command is longer than {limit} bytes")]
    LineTooLong { limit: usize },
}

/// The envelope named a known method but its fields are missing or mistyped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Undefined pass or user field")]
    MissingCredentials,
    #[error("Undefined label or point field")]
    MissingSendFields,
    #[error("Wrong integer in point")]
    InvalidPoint,
    #[error("Undefined label")]
    MissingLabel,
    #[error("Point would overflow the stored value")]
    PointOverflow,
}

/// Everything that turns a command into an error response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// `SEND`/`GET` before a successful `AUTH`.
    #[error("We don't know who you are")]
    Unauthorized,
    #[error("Wrong auth")]
    WrongCredentials,
    #[error("User with this name already exists")]
    UserExists,
    /// A snapshot could not be written; nothing was changed.
    #[error("Storage is temporarily unavailable")]
    Storage,
}
