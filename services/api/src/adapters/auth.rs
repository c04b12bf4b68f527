//! services/api/src/adapters/auth.rs
//!
//! The cookie-session adapter for the `AuthProvider` port. Sessions are issued
//! by the hosted auth provider; this side validates them and relays sign-out
//! transitions to the reader connection that holds the cookie.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use scripture_reader_core::domain::User;
use scripture_reader_core::ports::{
    AuthEvent, AuthEventStream, AuthProvider, AuthSessionStore, PortError, PortResult,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// An auth transition tied to one browser session cookie.
#[derive(Debug, Clone)]
pub struct SessionNotice {
    pub session_id: String,
    pub event: AuthEvent,
}

/// Fan-out of auth transitions to every live reader connection.
#[derive(Clone)]
pub struct AuthNotifier {
    sender: broadcast::Sender<SessionNotice>,
}

impl AuthNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn notify(&self, session_id: &str, event: AuthEvent) {
        // No receivers just means no reader is open for this session.
        let _ = self.sender.send(SessionNotice {
            session_id: session_id.to_string(),
            event,
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.sender.subscribe()
    }
}

impl Default for AuthNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// `AuthProvider` for one connection, identified by its session cookie.
pub struct CookieAuthProvider {
    session_id: Option<String>,
    sessions: Arc<dyn AuthSessionStore>,
    notifier: AuthNotifier,
}

impl CookieAuthProvider {
    pub fn new(session_id: Option<String>, sessions: Arc<dyn AuthSessionStore>, notifier: AuthNotifier) -> Self {
        Self {
            session_id,
            sessions,
            notifier,
        }
    }
}

#[async_trait]
impl AuthProvider for CookieAuthProvider {
    async fn current_user(&self) -> PortResult<Option<User>> {
        let Some(session_id) = &self.session_id else {
            return Ok(None);
        };
        match self.sessions.validate_auth_session(session_id).await {
            Ok(user) => Ok(Some(user)),
            Err(PortError::Unauthorized) | Err(PortError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn auth_events(&self) -> AuthEventStream {
        let Some(session_id) = self.session_id.clone() else {
            return futures::stream::empty().boxed();
        };
        let mut receiver = self.notifier.subscribe();
        stream! {
            loop {
                match receiver.recv().await {
                    Ok(notice) if notice.session_id == session_id => {
                        yield notice.event;
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth notice receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Auth notifier closed");
                        break;
                    }
                }
            }
        }
        .boxed()
    }
}
