//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a reader connection.
//! Each socket owns one `ReaderView`; store work the view asks for runs in
//! spawned tasks and is settled back under the view's lock.

use crate::adapters::CookieAuthProvider;
use crate::web::{
    middleware::SessionCookie,
    protocol::{ClientMessage, ServerMessage},
    state::{AppState, ConnectionState},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};
use scripture_reader_core::domain::{HighlightColor, SlotId, VerseId};
use scripture_reader_core::panels::{PanelChange, PanelRejection};
use scripture_reader_core::ports::{AuthEventStream, AuthProvider};
use scripture_reader_core::reader::{run_apply, run_bounds, run_fetch, run_probe, run_remove};
use scripture_reader_core::{ReaderEffects, ReaderError, SessionContext};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// The handler for upgrading HTTP requests to reader connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(SessionCookie(session_id)): Extension<SessionCookie>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, session_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, session_id: Option<String>) {
    let (mut sender, mut receiver) = socket.split();

    let provider = CookieAuthProvider::new(
        session_id,
        app_state.sessions.clone(),
        app_state.auth_notifier.clone(),
    );
    let session = match SessionContext::from_provider(&provider).await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to resolve reader session, continuing anonymously: {:?}", e);
            SessionContext::anonymous()
        }
    };
    info!(authenticated = session.is_authenticated(), "New reader connection established");

    // --- 1. Socket Writer ---
    let (outbox, mut outgoing) = mpsc::unbounded_channel::<ServerMessage>();
    let writer = tokio::spawn(async move {
        while let Some(msg) = outgoing.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server message: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                debug!("Client went away before a message could be sent.");
                break;
            }
        }
    });
    let conn = ConnectionState::new(app_state, session, outbox);

    // --- 2. Initial Load and Auth Transitions ---
    start_session(&conn, provider.auth_events()).await;

    // --- 3. Main Message Loop ---
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => handle_text_message(text.as_str(), &conn).await,
            Ok(Message::Close(_)) => {
                info!("Client sent close message.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Reader socket error: {}", e);
                break;
            }
        }
    }

    // --- 4. Cleanup ---
    conn.shutdown.cancel();
    writer.abort();
    info!("Reader connection closed.");
}

/// Sends the opening reader state, starts the first panel fetches, and
/// follows `events` for the life of the connection.
pub async fn start_session(conn: &ConnectionState, events: AuthEventStream) {
    let effects = conn.reader.lock().await.open();
    send_reader_state(conn).await;
    dispatch(conn, effects);
    follow_auth_events(conn, events);
}

/// Parses one client frame and runs it against the connection's reader.
pub async fn handle_text_message(text: &str, conn: &ConnectionState) {
    let client_msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            send(conn, ServerMessage::Error { message: format!("Invalid message: {}", e) });
            return;
        }
    };
    debug!(?client_msg, "Client message received");

    match client_msg {
        ClientMessage::SelectBook { book_id } => {
            let effects = conn.reader.lock().await.select_book(book_id);
            navigated(conn, effects).await;
        }
        ClientMessage::SelectChapter { chapter_number } => {
            let effects = conn.reader.lock().await.select_chapter(chapter_number);
            navigated(conn, effects).await;
        }
        ClientMessage::NextChapter => {
            let effects = conn.reader.lock().await.next_chapter();
            navigated(conn, effects).await;
        }
        ClientMessage::PreviousChapter => {
            let effects = conn.reader.lock().await.previous_chapter();
            navigated(conn, effects).await;
        }
        ClientMessage::AddPanel => {
            let (change, effects) = conn.reader.lock().await.add_slot();
            report_panel_change(conn, change).await;
            dispatch(conn, effects);
        }
        ClientMessage::RemovePanel { index } => {
            let change = conn.reader.lock().await.remove_slot(index);
            report_panel_change(conn, change).await;
        }
        ClientMessage::ChangeVersion { index, version } => {
            let version = version.trim().to_uppercase();
            let (change, effects) = conn.reader.lock().await.change_slot_version(index, &version);
            report_panel_change(conn, change).await;
            dispatch(conn, effects);
        }
        ClientMessage::ToggleVerse { slot_id, verse_id } => toggle_verse(conn, slot_id, verse_id).await,
        ClientMessage::ApplyHighlight { slot_id, color } => {
            run_highlight(conn, slot_id, HighlightAction::Apply(color)).await
        }
        ClientMessage::RemoveHighlight { slot_id } => run_highlight(conn, slot_id, HighlightAction::Remove).await,
    }
}

//=========================================================================================
// Store Work
//=========================================================================================

/// Spawns `task`, dropping it if the connection closes first.
fn spawn_store_task<F>(conn: &ConnectionState, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let token = conn.shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = task => {}
        }
    });
}

/// Runs the fetches and bounds lookup a transition asked for. Every panel
/// fetch is its own task, so one slow version never holds up the others.
fn dispatch(conn: &ConnectionState, effects: ReaderEffects) {
    let ReaderEffects { bounds, fetches } = effects;

    for fetch in fetches {
        let conn_task = conn.clone();
        spawn_store_task(conn, async move {
            let user = conn_task.session.current_user();
            let outcome = run_fetch(&conn_task.app_state.fetcher, user.as_ref(), &fetch).await;
            let panel = {
                let mut reader = conn_task.reader.lock().await;
                if reader.settle_fetch(&fetch, outcome) {
                    reader.panel_snapshot(fetch.slot_id)
                } else {
                    debug!(slot = %fetch.slot_id, key = %fetch.key, "Discarding superseded fetch");
                    None
                }
            };
            if let Some(panel) = panel {
                send(&conn_task, ServerMessage::PanelUpdated { panel });
            }
        });
    }

    if let Some(request) = bounds {
        let conn_task = conn.clone();
        spawn_store_task(conn, async move {
            let lookup = run_bounds(&conn_task.app_state.fetcher, request).await;
            let effects = conn_task.reader.lock().await.settle_bounds(request, lookup);
            send_reader_state(&conn_task).await;
            dispatch(&conn_task, effects);
        });
    }
}

/// Applies sign-in/sign-out for this connection's cookie and reloads the
/// panels so highlight overlays match the new user.
fn follow_auth_events(conn: &ConnectionState, mut events: AuthEventStream) {
    let conn_task = conn.clone();
    spawn_store_task(conn, async move {
        while let Some(event) = events.next().await {
            conn_task.session.apply(event);
            let effects = {
                let mut reader = conn_task.reader.lock().await;
                if !conn_task.session.is_authenticated() {
                    reader.clear_selections();
                }
                reader.refresh()
            };
            send_reader_state(&conn_task).await;
            dispatch(&conn_task, effects);
        }
    });
}

//=========================================================================================
// Panels and Navigation
//=========================================================================================

async fn navigated(conn: &ConnectionState, effects: ReaderEffects) {
    if effects.is_empty() {
        return;
    }
    send_reader_state(conn).await;
    dispatch(conn, effects);
}

async fn report_panel_change(conn: &ConnectionState, change: PanelChange) {
    match change {
        PanelChange::Rejected(reason) => {
            send_rejection(conn, reason);
        }
        PanelChange::Added(_) | PanelChange::Removed(_) | PanelChange::VersionChanged(_) => {
            send_reader_state(conn).await;
        }
    }
}

//=========================================================================================
// Selection and Highlights
//=========================================================================================

async fn toggle_verse(conn: &ConnectionState, slot_id: SlotId, verse_id: VerseId) {
    let toggled = conn.reader.lock().await.toggle_select(slot_id, verse_id);
    let probe = match toggled {
        Ok(probe) => probe,
        Err(reason) => {
            send_rejection(conn, reason);
            return;
        }
    };
    send_selection(conn, slot_id).await;

    let Some(request) = probe else {
        return;
    };
    let conn_task = conn.clone();
    spawn_store_task(conn, async move {
        let user = conn_task.session.current_user();
        let outcome = run_probe(&conn_task.app_state.fetcher, user.as_ref(), &request).await;
        let applied = conn_task.reader.lock().await.settle_probe(&request, &outcome);
        if !applied {
            return;
        }
        send_selection(&conn_task, request.slot_id).await;
        if let Err(e) = outcome {
            send(&conn_task, ServerMessage::Toast { message: e.user_message() });
        }
    });
}

enum HighlightAction {
    Apply(HighlightColor),
    Remove,
}

/// Applies or removes highlights for a panel's selection. Runs inline so a
/// panel never has two highlight writes in flight.
async fn run_highlight(conn: &ConnectionState, slot_id: SlotId, action: HighlightAction) {
    let request = conn.reader.lock().await.highlight_request(slot_id);
    let request = match request {
        Ok(Some(request)) => request,
        Ok(None) => return,
        Err(ReaderError::Unauthenticated) => {
            send(conn, ServerMessage::AuthRequired);
            return;
        }
        Err(e) => {
            send(conn, ServerMessage::Toast { message: e.user_message() });
            return;
        }
    };

    let fetcher = &conn.app_state.fetcher;
    let outcome = match action {
        HighlightAction::Apply(color) => run_apply(fetcher, &request, color).await,
        HighlightAction::Remove => run_remove(fetcher, &request).await,
    };

    let effects = conn.reader.lock().await.finish_highlight(slot_id, &outcome);
    send_selection(conn, slot_id).await;
    if let Err(e) = &outcome {
        send(conn, ServerMessage::Toast { message: e.user_message() });
    }
    dispatch(conn, effects);
}

//=========================================================================================
// Outbound Messages
//=========================================================================================

/// Queues `msg` for the socket writer.
fn send(conn: &ConnectionState, msg: ServerMessage) {
    if conn.outbox.send(msg).is_err() {
        debug!("Client went away before a message could be queued.");
    }
}

async fn send_reader_state(conn: &ConnectionState) {
    let reader = conn.reader.lock().await.snapshot();
    send(conn, ServerMessage::ReaderState { reader });
}

async fn send_selection(conn: &ConnectionState, slot_id: SlotId) {
    let panel = conn.reader.lock().await.panel_snapshot(slot_id);
    if let Some(panel) = panel {
        send(conn, ServerMessage::SelectionChanged { slot_id, selection: panel.selection });
    }
}

fn send_rejection(conn: &ConnectionState, reason: PanelRejection) {
    send(conn, ServerMessage::PanelRejected { reason, message: reason.to_string() });
}
