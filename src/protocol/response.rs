//! Server → client response envelope.

use super::error::SessionError;
use serde::Serialize;

pub const WELCOME: &str = "Welcome!";
pub const AUTHENTICATED: &str = "Here we go again";
pub const ACCEPTED: &str = "Accepted";

/// Plain-text line written once the client's stream has ended.
pub const FAREWELL: &str = "Good bye";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "error")]
    Error,
}

/// One JSON response line.
///
/// `data` is only emitted for `GET`; its inner `None` serializes as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Option<i64>>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            message: None,
            data: None,
        }
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    pub fn data(value: Option<i64>) -> Self {
        Self {
            data: Some(value),
            ..Self::ok()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
            data: None,
        }
    }
}

impl From<SessionError> for Response {
    fn from(err: SessionError) -> Self {
        Self::error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::error::ValidationError;

    fn wire(response: &Response) -> String {
        serde_json::to_string(response).unwrap()
    }

    #[test]
    fn bare_ok() {
        assert_eq!(wire(&Response::ok()), r#"{"status":"OK"}"#);
    }

    #[test]
    fn ok_with_message() {
        assert_eq!(
            wire(&Response::ok_with(ACCEPTED)),
            r#"{"status":"OK","message":"Accepted"}"#
        );
    }

    #[test]
    fn data_present_and_absent() {
        assert_eq!(wire(&Response::data(Some(8))), r#"{"status":"OK","data":8}"#);
        assert_eq!(wire(&Response::data(None)), r#"{"status":"OK","data":null}"#);
    }

    #[test]
    fn errors_carry_the_error_text() {
        let response = Response::from(SessionError::Unauthorized);
        assert_eq!(response.status, Status::Error);
        assert_eq!(
            wire(&response),
            r#"{"status":"error","message":"We don't know who you are"}"#
        );

        let response = Response::from(SessionError::from(ValidationError::InvalidPoint));
        assert_eq!(response.message.as_deref(), Some("Wrong integer in point"));
    }
}
