//! Client commands.
//!
//! Decoding happens in two steps so the session can enforce authentication
//! between them: [`Envelope::parse`] turns a line into a known [`Method`] plus
//! its raw fields, then [`Command::decode`] validates those fields.

use super::error::{ProtocolError, ValidationError};
use serde_json::{Map, Value};
use std::fmt;

/// Field that names the command on the wire.
const METHOD_FIELD: &str = "method_name";

/// Placeholder method name that older clients send for "no command".
const EMPTY_METHOD: &str = "EMPTY";

/// The closed set of methods the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Register,
    Authenticate,
    Send,
    Get,
}

impl Method {
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "REG" => Some(Self::Register),
            "AUTH" => Some(Self::Authenticate),
            "SEND" => Some(Self::Send),
            "GET" => Some(Self::Get),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Register => "REG",
            Self::Authenticate => "AUTH",
            Self::Send => "SEND",
            Self::Get => "GET",
        }
    }

    /// Whether the method operates on the caller's own counters.
    pub fn requires_identity(self) -> bool {
        matches!(self, Self::Send | Self::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed line whose fields have not been validated yet.
#[derive(Debug, Clone)]
pub struct Envelope {
    method: Method,
    fields: Map<String, Value>,
}

impl Envelope {
    /// Parse one (already trimmed) line.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut fields: Map<String, Value> =
            serde_json::from_str(line).map_err(|_| ProtocolError::Unparseable)?;

        let method = match fields.remove(METHOD_FIELD) {
            None => return Err(ProtocolError::MissingMethod),
            Some(Value::String(name)) if name == EMPTY_METHOD => {
                return Err(ProtocolError::MissingMethod)
            }
            Some(Value::String(name)) => {
                Method::from_wire(&name).ok_or(ProtocolError::UnknownMethod(name))?
            }
            Some(other) => return Err(ProtocolError::UnknownMethod(other.to_string())),
        };

        Ok(Self { method, fields })
    }

    pub fn method(&self) -> Method {
        self.method
    }

    fn string_field(&self, name: &str) -> Option<String> {
        self.fields.get(name)?.as_str().map(str::to_owned)
    }
}

/// Username and password carried by `REG` and `AUTH`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

/// A fully validated command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register(Credentials),
    Authenticate(Credentials),
    Send { label: String, point: i64 },
    Get { label: String },
}

impl Command {
    pub fn decode(envelope: Envelope) -> Result<Self, ValidationError> {
        match envelope.method {
            Method::Register => Ok(Self::Register(credentials(&envelope)?)),
            Method::Authenticate => Ok(Self::Authenticate(credentials(&envelope)?)),
            Method::Send => {
                let (Some(label), Some(point)) =
                    (envelope.fields.get("label"), envelope.fields.get("point"))
                else {
                    return Err(ValidationError::MissingSendFields);
                };
                let label = label
                    .as_str()
                    .ok_or(ValidationError::MissingSendFields)?
                    .to_owned();
                let point = point.as_i64().ok_or(ValidationError::InvalidPoint)?;
                Ok(Self::Send { label, point })
            }
            Method::Get => {
                let label = envelope
                    .string_field("label")
                    .ok_or(ValidationError::MissingLabel)?;
                Ok(Self::Get { label })
            }
        }
    }
}

fn credentials(envelope: &Envelope) -> Result<Credentials, ValidationError> {
    match (envelope.string_field("user"), envelope.string_field("pass")) {
        (Some(user), Some(pass)) => Ok(Credentials { user, pass }),
        _ => Err(ValidationError::MissingCredentials),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
