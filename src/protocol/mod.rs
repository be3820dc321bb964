//! Line-oriented JSON protocol.
//!
//! Every client line is one JSON object naming a `method_name`:
//!
//! ```text
//! {"method_name":"REG","user":"a","pass":"x"}     → {"status":"OK","message":"Welcome!"}
//! {"method_name":"AUTH","user":"a","pass":"x"}    → {"status":"OK","message":"Here we go again"}
//! {"method_name":"SEND","label":"t","point":5}    → {"status":"OK","message":"Accepted"}
//! {"method_name":"GET","label":"t"}               → {"status":"OK","data":5}
//! ```
//!
//! Failures are `{"status":"error","message":...}` and never close the
//! connection. When the client closes its side the server answers with a
//! plain `Good bye` line.

pub mod codec;
pub mod command;
pub mod error;
pub mod response;

pub use codec::{CommandCodec, Frame, Outbound};
pub use command::{Command, Credentials, Envelope, Method};
pub use error::{ProtocolError, SessionError, ValidationError};
pub use response::{Response, Status};
