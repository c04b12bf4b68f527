use api_lib::config::Config;
use api_lib::web::protocol::ServerMessage;
use api_lib::web::state::{AppState, ConnectionState};
use api_lib::web::ws_handler::{handle_text_message, start_session};
use futures::channel::mpsc as auth_channel;
use scripture_reader_core::domain::{HighlightColor, SlotId, User, VerseId};
use scripture_reader_core::panels::PanelRejection;
use scripture_reader_core::ports::AuthEvent;
use scripture_reader_core::reader::{PanelSnapshot, PanelStatus};
use scripture_reader_core::{InMemoryStore, SessionContext};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

struct Harness {
    store: Arc<InMemoryStore>,
    conn: ConnectionState,
    outgoing: mpsc::UnboundedReceiver<ServerMessage>,
    auth_events: auth_channel::UnboundedSender<AuthEvent>,
}

impl Harness {
    async fn open(user: Option<User>) -> Self {
        let config = Config::from_lookup(|name| match name {
            "STORE_BACKEND" => Some("memory".to_string()),
            _ => None,
        })
        .unwrap();
        let store = Arc::new(InMemoryStore::with_sample());
        let app_state = Arc::new(AppState::new(store.clone(), Arc::new(config)));
        let (outbox, outgoing) = mpsc::unbounded_channel();
        let conn = ConnectionState::new(app_state, SessionContext::new(user), outbox);
        let (auth_events, events) = auth_channel::unbounded();
        start_session(&conn, Box::pin(events)).await;
        Self { store, conn, outgoing, auth_events }
    }

    async fn client(&self, msg: serde_json::Value) {
        handle_text_message(&msg.to_string(), &self.conn).await;
    }

    /// Waits for the next message `pred` accepts, skipping the rest.
    async fn next_matching<F>(&mut self, mut pred: F) -> ServerMessage
    where
        F: FnMut(&ServerMessage) -> bool,
    {
        let outgoing = &mut self.outgoing;
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let msg = outgoing.recv().await.expect("outbox closed");
                if pred(&msg) {
                    return msg;
                }
            }
        })
        .await
        .expect("timed out waiting for a server message")
    }

    /// Waits until the panel at `index` has settled with verses and returns it.
    async fn ready_panel(&mut self, index: usize) -> PanelSnapshot {
        let msg = self
            .next_matching(|m| {
                matches!(m, ServerMessage::PanelUpdated { panel }
                    if panel.index == index && matches!(panel.status, PanelStatus::Ready { .. }))
            })
            .await;
        match msg {
            ServerMessage::PanelUpdated { panel } => panel,
            other => panic!("unexpected message {:?}", other),
        }
    }
}

fn first_verse(panel: &PanelSnapshot) -> VerseId {
    match &panel.status {
        PanelStatus::Ready { verses } => verses[0].id,
        other => panic!("panel not ready: {:?}", other),
    }
}

fn signed_in() -> User {
    User { user_id: Uuid::new_v4(), email: Some("leitor@example.com".into()) }
}

async fn selected_count(conn: &ConnectionState, slot_id: SlotId) -> usize {
    conn.reader.lock().await.panels().get(slot_id).unwrap().selection.selected().len()
}

#[tokio::test]
async fn connect_sends_state_then_the_first_chapter() {
    let mut h = Harness::open(None).await;

    match h.outgoing.recv().await.unwrap() {
        ServerMessage::ReaderState { reader } => {
            assert!(!reader.authenticated);
            assert_eq!(reader.panels.len(), 1);
            assert_eq!(reader.navigation.chapter_number, 1);
        }
        other => panic!("expected reader_state first, got {:?}", other),
    }

    let panel = h.ready_panel(0).await;
    let PanelStatus::Ready { verses } = &panel.status else { unreachable!() };
    assert_eq!(verses.len(), 31);
    assert_eq!(panel.slot.version_code, "ACF");
}

#[tokio::test]
async fn panel_count_limits_are_rejected() {
    let mut h = Harness::open(None).await;
    h.ready_panel(0).await;

    for _ in 0..3 {
        h.client(json!({"type": "add_panel"})).await;
    }
    h.client(json!({"type": "add_panel"})).await;
    let msg = h.next_matching(|m| matches!(m, ServerMessage::PanelRejected { .. })).await;
    assert!(matches!(msg, ServerMessage::PanelRejected { reason: PanelRejection::TooManyPanels, .. }));
    assert_eq!(h.conn.reader.lock().await.panels().len(), 4);

    for _ in 0..3 {
        h.client(json!({"type": "remove_panel", "index": 0})).await;
    }
    h.client(json!({"type": "remove_panel", "index": 0})).await;
    let msg = h.next_matching(|m| matches!(m, ServerMessage::PanelRejected { .. })).await;
    assert!(matches!(msg, ServerMessage::PanelRejected { reason: PanelRejection::LastPanel, .. }));
    assert_eq!(h.conn.reader.lock().await.panels().len(), 1);
}

#[tokio::test]
async fn anonymous_apply_asks_for_sign_in_without_writing() {
    let mut h = Harness::open(None).await;
    let panel = h.ready_panel(0).await;
    let slot_id = panel.slot.id;

    h.client(json!({"type": "toggle_verse", "slot_id": slot_id, "verse_id": first_verse(&panel)})).await;
    h.client(json!({"type": "apply_highlight", "slot_id": slot_id, "color": "green"})).await;

    h.next_matching(|m| matches!(m, ServerMessage::AuthRequired)).await;
    assert_eq!(h.store.write_count(), 0);
    assert_eq!(selected_count(&h.conn, slot_id).await, 1);
}

#[tokio::test]
async fn signed_in_apply_shows_the_new_color() {
    let user = signed_in();
    let mut h = Harness::open(Some(user.clone())).await;
    let panel = h.ready_panel(0).await;
    let slot_id = panel.slot.id;
    let verse = first_verse(&panel);

    h.client(json!({"type": "toggle_verse", "slot_id": slot_id, "verse_id": verse})).await;
    h.client(json!({"type": "apply_highlight", "slot_id": slot_id, "color": "green"})).await;

    let msg = h
        .next_matching(|m| match m {
            ServerMessage::PanelUpdated { panel } => match &panel.status {
                PanelStatus::Ready { verses } => verses[0].highlight == Some(HighlightColor::Green),
                _ => false,
            },
            ServerMessage::Toast { message } => panic!("unexpected toast: {}", message),
            _ => false,
        })
        .await;
    assert!(matches!(msg, ServerMessage::PanelUpdated { .. }));

    let rows = h.store.highlight_rows(verse, user.user_id);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].color, HighlightColor::Green);
    assert_eq!(selected_count(&h.conn, slot_id).await, 0);
}

#[tokio::test]
async fn failed_write_toasts_and_keeps_the_selection() {
    let user = signed_in();
    let mut h = Harness::open(Some(user.clone())).await;
    let panel = h.ready_panel(0).await;
    let slot_id = panel.slot.id;
    let verse = first_verse(&panel);

    h.store.fail_operation("insert_highlight");
    h.client(json!({"type": "toggle_verse", "slot_id": slot_id, "verse_id": verse})).await;
    h.client(json!({"type": "apply_highlight", "slot_id": slot_id, "color": "yellow"})).await;

    h.next_matching(|m| matches!(m, ServerMessage::Toast { .. })).await;
    assert_eq!(selected_count(&h.conn, slot_id).await, 1);
    assert!(h.store.highlight_rows(verse, user.user_id).is_empty());
}

#[tokio::test]
async fn failed_highlight_lookup_toasts() {
    let mut h = Harness::open(Some(signed_in())).await;
    let panel = h.ready_panel(0).await;
    let slot_id = panel.slot.id;

    h.store.fail_operation("get_highlight");
    h.client(json!({"type": "toggle_verse", "slot_id": slot_id, "verse_id": first_verse(&panel)})).await;

    let msg = h.next_matching(|m| matches!(m, ServerMessage::Toast { .. })).await;
    let ServerMessage::Toast { message } = msg else { unreachable!() };
    assert!(message.contains("try again"));
    assert_eq!(selected_count(&h.conn, slot_id).await, 1);
}

#[tokio::test]
async fn sign_out_clears_selections_and_reloads_anonymously() {
    let mut h = Harness::open(Some(signed_in())).await;
    let panel = h.ready_panel(0).await;
    let slot_id = panel.slot.id;

    h.client(json!({"type": "toggle_verse", "slot_id": slot_id, "verse_id": first_verse(&panel)})).await;
    assert_eq!(selected_count(&h.conn, slot_id).await, 1);

    h.auth_events.unbounded_send(AuthEvent::SignedOut).unwrap();
    let msg = h
        .next_matching(|m| matches!(m, ServerMessage::ReaderState { reader } if !reader.authenticated))
        .await;
    let ServerMessage::ReaderState { reader } = msg else { unreachable!() };
    assert!(reader.panels.iter().all(|p| p.selection.verse_ids.is_empty()));
    assert!(!h.conn.session.is_authenticated());
}

#[tokio::test]
async fn unknown_version_fails_inside_its_panel() {
    let mut h = Harness::open(None).await;
    h.ready_panel(0).await;

    h.client(json!({"type": "change_version", "index": 0, "version": " xyz "})).await;
    let msg = h
        .next_matching(|m| {
            matches!(m, ServerMessage::PanelUpdated { panel } if matches!(panel.status, PanelStatus::Failed { .. }))
        })
        .await;
    let ServerMessage::PanelUpdated { panel } = msg else { unreachable!() };
    assert_eq!(panel.slot.version_code, "XYZ");
    match panel.status {
        PanelStatus::Failed { message, inline } => {
            assert!(inline);
            assert!(message.contains("XYZ version isn't available yet"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn malformed_frame_gets_an_error_reply() {
    let mut h = Harness::open(None).await;
    handle_text_message("{not json", &h.conn).await;
    h.next_matching(|m| matches!(m, ServerMessage::Error { .. })).await;

    h.client(json!({"type": "apply_highlight", "slot_id": 1, "color": "red"})).await;
    h.next_matching(|m| matches!(m, ServerMessage::Error { .. })).await;
}
