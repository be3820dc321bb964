//! Username/password credentials for the `REG` and `AUTH` commands.
//!
//! Passwords are stored and compared as given. Hashing is not part of the
//! wire contract this server implements.

pub mod store;

pub use store::{CredentialStore, RegisterError};
