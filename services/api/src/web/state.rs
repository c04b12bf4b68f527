//! services/api/src/web/state.rs
//!
//! Defines the application's shared and connection-specific states.

use crate::adapters::AuthNotifier;
use crate::config::Config;
use crate::web::protocol::ServerMessage;
use scripture_reader_core::ports::{AuthSessionStore, ScriptureStore};
use scripture_reader_core::{ReaderView, SessionContext, VerseFetcher};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ScriptureStore>,
    pub sessions: Arc<dyn AuthSessionStore>,
    /// One verse cache for every reader; highlight overlays are keyed per user.
    pub fetcher: Arc<VerseFetcher>,
    pub auth_notifier: AuthNotifier,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new<S>(store: Arc<S>, config: Arc<Config>) -> Self
    where
        S: ScriptureStore + AuthSessionStore + 'static,
    {
        Self {
            store: store.clone(),
            sessions: store.clone(),
            fetcher: Arc::new(VerseFetcher::new(store)),
            auth_notifier: AuthNotifier::default(),
            config,
        }
    }
}

//=========================================================================================
// ConnectionState (Specific to One WebSocket Connection)
//=========================================================================================

/// Messages queued for the socket writer task, in send order.
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// The state for a single, active reader connection.
#[derive(Clone)]
pub struct ConnectionState {
    pub app_state: Arc<AppState>,
    pub reader: Arc<Mutex<ReaderView>>,
    /// Shared with `reader`; readable without taking the reader lock.
    pub session: SessionContext,
    pub outbox: Outbox,
    /// Cancelled when the socket closes; stops every spawned store task.
    pub shutdown: CancellationToken,
}

impl ConnectionState {
    /// Builds a reader at the configured book and version for `session`.
    pub fn new(app_state: Arc<AppState>, session: SessionContext, outbox: Outbox) -> Self {
        let reader = ReaderView::new(
            app_state.fetcher.clone(),
            session.clone(),
            app_state.config.default_book_id,
            &app_state.config.default_version,
        );
        Self {
            app_state,
            reader: Arc::new(Mutex::new(reader)),
            session,
            outbox,
            shutdown: CancellationToken::new(),
        }
    }
}
