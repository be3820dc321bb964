//! Per-connection protocol state machine.
//!
//! A session starts unauthenticated and becomes bound to a user after a
//! successful `AUTH`. It reads one command per line, answers each command
//! with exactly one response line, and ends when the peer closes its side
//! (or the server shuts down), after writing a plain `Good bye` line.
//!
//! Writes give way to shutdown: a peer that stops reading cannot keep the
//! session (and with it the whole server) alive.
//!
//! Store calls run on the blocking pool: they hold a store lock across file
//! I/O and must not stall the async workers.

use crate::protocol::response::{ACCEPTED, AUTHENTICATED, WELCOME};
use crate::protocol::{
    Command, CommandCodec, Credentials, Envelope, Frame, Outbound, ProtocolError, Response,
    SessionError, ValidationError,
};
use crate::server::AppState;
use crate::{auth::RegisterError, counters::AccumulateError};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

/// Authentication state of one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    Authenticated(String),
}

pub struct Session {
    state: AppState,
    auth: AuthState,
}

impl Session {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            auth: AuthState::Unauthenticated,
        }
    }

    pub fn auth_state(&self) -> &AuthState {
        &self.auth
    }

    /// The user this connection is bound to, if any.
    pub fn user(&self) -> Option<&str> {
        match &self.auth {
            AuthState::Authenticated(user) => Some(user),
            AuthState::Unauthenticated => None,
        }
    }

    /// Serve one connection until the peer closes it or `shutdown` fires.
    ///
    /// Shutdown is observed while waiting for the next line and while a
    /// write is blocked on the peer. A command that is already executing
    /// always finishes; only delivery of its answer can be abandoned.
    pub async fn run<T>(
        mut self,
        io: T,
        max_line_bytes: usize,
        shutdown: CancellationToken,
    ) -> std::io::Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(io, CommandCodec::new(max_line_bytes));

        loop {
            let frame = tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::debug!(user = ?self.user(), "Session interrupted by shutdown");
                    break;
                }
                frame = framed.next() => frame,
            };

            let response = match frame {
                None => break,
                Some(Err(e)) => {
                    tracing::debug!("Connection read failed: {e}");
                    return Err(e);
                }
                Some(Ok(Frame::Invalid(err))) => Response::from(SessionError::from(err)),
                Some(Ok(Frame::Line(line))) => self.handle_line(&line).await,
            };

            if !deliver(&mut framed, Outbound::from(response), &shutdown).await? {
                tracing::debug!(user = ?self.user(), "Peer not reading at shutdown, dropping it");
                return Ok(());
            }
        }

        // The peer may already be fully gone; the farewell is best effort.
        match deliver(&mut framed, Outbound::Farewell, &shutdown).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Farewell abandoned at shutdown"),
            Err(e) => tracing::debug!("Could not deliver farewell: {e}"),
        }
        Ok(())
    }

    /// Handle one trimmed line. Every line, blank ones included, gets exactly
    /// one response.
    pub async fn handle_line(&mut self, line: &str) -> Response {
        match self.dispatch(line).await {
            Ok(response) => response,
            Err(err) => {
                if let SessionError::Protocol(ProtocolError::UnknownMethod(name)) = &err {
                    tracing::debug!(user = ?self.user(), method = %name, "Unknown method");
                } else {
                    tracing::debug!(user = ?self.user(), "Command rejected: {err}");
                }
                Response::from(err)
            }
        }
    }

    async fn dispatch(&mut self, line: &str) -> Result<Response, SessionError> {
        let envelope = Envelope::parse(line)?;
        tracing::trace!(user = ?self.user(), method = %envelope.method(), "Command received");
        if envelope.method().requires_identity() {
            self.require_user()?;
        }

        match Command::decode(envelope)? {
            Command::Register(credentials) => self.register(credentials).await,
            Command::Authenticate(credentials) => self.authenticate(credentials).await,
            Command::Send { label, point } => {
                let owner = self.require_user()?.to_owned();
                self.send(owner, label, point).await
            }
            Command::Get { label } => {
                let owner = self.require_user()?.to_owned();
                self.get(owner, label).await
            }
        }
    }

    fn require_user(&self) -> Result<&str, SessionError> {
        self.user().ok_or(SessionError::Unauthorized)
    }

    async fn register(&self, credentials: Credentials) -> Result<Response, SessionError> {
        let store = self.state.credentials.clone();
        let Credentials { user, pass } = credentials;

        match blocking(move || store.register(&user, &pass)).await? {
            Ok(()) => Ok(Response::ok_with(WELCOME)),
            Err(RegisterError::AlreadyExists(_)) => Err(SessionError::UserExists),
            Err(RegisterError::Storage(e)) => {
                tracing::error!("Failed to persist credentials: {e}");
                Err(SessionError::Storage)
            }
        }
    }

    async fn authenticate(&mut self, credentials: Credentials) -> Result<Response, SessionError> {
        let store = self.state.credentials.clone();
        let Credentials { user, pass } = credentials;

        let (user, verified) = blocking(move || {
            let verified = store.verify(&user, &pass);
            (user, verified)
        })
        .await?;

        if !verified {
            tracing::info!(user = %user, "Authentication failed");
            return Err(SessionError::WrongCredentials);
        }

        tracing::info!(user = %user, "Authenticated");
        self.auth = AuthState::Authenticated(user);
        Ok(Response::ok_with(AUTHENTICATED))
    }

    async fn send(
        &self,
        owner: String,
        label: String,
        point: i64,
    ) -> Result<Response, SessionError> {
        let store = self.state.counters.clone();

        match blocking(move || store.accumulate(&owner, &label, point)).await? {
            Ok(value) => {
                tracing::debug!(value, "Counter updated");
                Ok(Response::ok_with(ACCEPTED))
            }
            Err(AccumulateError::Overflow { .. }) => Err(ValidationError::PointOverflow.into()),
            Err(AccumulateError::Storage(e)) => {
                tracing::error!("Failed to persist counters: {e}");
                Err(SessionError::Storage)
            }
        }
    }

    async fn get(&self, owner: String, label: String) -> Result<Response, SessionError> {
        let store = self.state.counters.clone();
        let value = blocking(move || store.get(&owner, &label)).await?;
        Ok(Response::data(value))
    }
}

/// Write one item, giving up if shutdown fires while the peer is not reading.
///
/// The write is polled first, so a peer with room in its buffer still gets
/// the item even when shutdown has already been requested. Returns `false`
/// when the item was abandoned.
async fn deliver<T>(
    framed: &mut Framed<T, CommandCodec>,
    item: Outbound,
    shutdown: &CancellationToken,
) -> std::io::Result<bool>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    tokio::select! {
        biased;
        sent = framed.send(item) => sent.map(|()| true),
        () = shutdown.cancelled() => Ok(false),
    }
}

/// Run a store call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, SessionError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!("Store task failed: {e}");
        SessionError::Storage
    })
}

// ── Tests ───────────────────────────────────────────────────────────
