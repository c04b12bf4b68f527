//! crates/scripture_reader_core/src/session.rs
//!
//! The explicit auth context handed to a reader at construction time.

use crate::domain::User;
use crate::ports::{AuthEvent, AuthEventStream, AuthProvider, PortResult};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Who is signed in for this reader session. Cloning shares the same state.
#[derive(Clone)]
pub struct SessionContext {
    user: Arc<watch::Sender<Option<User>>>,
}

impl SessionContext {
    pub fn new(user: Option<User>) -> Self {
        let (tx, _rx) = watch::channel(user);
        Self { user: Arc::new(tx) }
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }

    /// Seeds the context from the provider's current user.
    pub async fn from_provider(provider: &dyn AuthProvider) -> PortResult<Self> {
        Ok(Self::new(provider.current_user().await?))
    }

    pub fn current_user(&self) -> Option<User> {
        self.user.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.borrow().is_some()
    }

    pub fn apply(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(user) => {
                info!(user_id = %user.user_id, "Reader session signed in");
                self.user.send_replace(Some(user));
            }
            AuthEvent::SignedOut => {
                info!("Reader session signed out");
                self.user.send_replace(None);
            }
        }
    }

    /// Applies events until the stream ends.
    pub async fn follow(&self, mut events: AuthEventStream) {
        while let Some(event) = events.next().await {
            self.apply(event);
        }
    }

    /// Notified on every sign-in or sign-out.
    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.user.subscribe()
    }
}
