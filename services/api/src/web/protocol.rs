//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser reader and the API
//! server. Every message is a JSON object tagged by its `type` field.

use scripture_reader_core::domain::{BookId, HighlightColor, SlotId, VerseId};
use scripture_reader_core::panels::PanelRejection;
use scripture_reader_core::reader::{PanelSnapshot, ReaderSnapshot, SelectionSnapshot};
use serde::{Deserialize, Serialize};

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Book selector: jump to chapter 1 of another book.
    SelectBook { book_id: BookId },

    /// Chapter selector.
    SelectChapter { chapter_number: u32 },

    NextChapter,

    PreviousChapter,

    /// Opens another version panel on the default version.
    AddPanel,

    RemovePanel { index: usize },

    /// Per-panel version selector.
    ChangeVersion { index: usize, version: String },

    /// Click on a verse in one panel.
    ToggleVerse { slot_id: SlotId, verse_id: VerseId },

    /// Color chosen on the floating highlight toolbar.
    ApplyHighlight { slot_id: SlotId, color: HighlightColor },

    RemoveHighlight { slot_id: SlotId },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The whole reader, sent on connect and after navigation or panel changes.
    ReaderState { reader: ReaderSnapshot },

    /// One panel resolved its latest fetch.
    PanelUpdated { panel: PanelSnapshot },

    /// One panel's selection or its highlight status changed. The floating
    /// toolbar is shown while `phase` is `selecting`.
    SelectionChanged { slot_id: SlotId, selection: SelectionSnapshot },

    /// A panel control was refused (e.g. a fifth panel).
    PanelRejected { reason: PanelRejection, message: String },

    /// A transient, recoverable failure.
    Toast { message: String },

    /// A highlight action needs a signed-in user.
    AuthRequired,

    /// A malformed client message.
    Error { message: String },
}
