//! crates/scripture_reader_core/src/panels.rs
//!
//! The ordered set of 1 to 4 version panels. Each panel reads the shared
//! book/chapter with its own version and keeps its own fetch state and
//! selection.

use crate::domain::{BookId, SlotId, Verse, VersionSlot};
use crate::error::{ReaderError, ReaderResult};
use crate::fetcher::{HighlightMap, VerseKey};
use crate::selection::SelectionState;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

pub const MAX_PANELS: usize = 4;

/// Viewport width (px) from which panels sit side by side.
pub const SIDE_BY_SIDE_MIN_WIDTH: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    SideBySide,
    Stacked,
}

impl LayoutMode {
    pub fn for_width(width: u32) -> Self {
        if width >= SIDE_BY_SIDE_MIN_WIDTH {
            LayoutMode::SideBySide
        } else {
            LayoutMode::Stacked
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PanelView {
    Loading,
    Ready(Arc<Vec<Verse>>),
    Failed(ReaderError),
}

/// Why a panel operation did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum PanelRejection {
    #[error("At most 4 versions can be compared at once")]
    TooManyPanels,
    #[error("At least one version must stay open")]
    LastPanel,
    #[error("No such panel")]
    NoSuchPanel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelChange {
    Added(SlotId),
    Removed(SlotId),
    VersionChanged(SlotId),
    Rejected(PanelRejection),
}

/// A verse fetch dispatched for one panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelFetch {
    pub slot_id: SlotId,
    pub key: VerseKey,
    /// Position among this panel's dispatches; only the latest one settles.
    sequence: u64,
}

#[derive(Debug, Clone)]
pub struct VersionPanel {
    pub slot: VersionSlot,
    pub view: PanelView,
    pub highlights: Arc<HighlightMap>,
    pub selection: SelectionState,
    key: Option<VerseKey>,
    fetch_sequence: u64,
}

impl VersionPanel {
    fn new(slot: VersionSlot) -> Self {
        Self {
            slot,
            view: PanelView::Loading,
            highlights: Arc::new(HighlightMap::new()),
            selection: SelectionState::new(),
            key: None,
            fetch_sequence: 0,
        }
    }

    /// The key this panel currently wants to display.
    pub fn key(&self) -> Option<&VerseKey> {
        self.key.as_ref()
    }

    pub fn verses(&self) -> Option<&Arc<Vec<Verse>>> {
        match &self.view {
            PanelView::Ready(verses) => Some(verses),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PanelSet {
    panels: Vec<VersionPanel>,
    next_id: u64,
    default_version: String,
}

impl PanelSet {
    /// A set with one panel on `default_version`.
    pub fn new(default_version: &str) -> Self {
        let mut set = Self {
            panels: Vec::with_capacity(MAX_PANELS),
            next_id: 0,
            default_version: default_version.to_string(),
        };
        set.push(default_version);
        set
    }

    fn push(&mut self, version_code: &str) -> SlotId {
        self.next_id += 1;
        let id = SlotId(self.next_id);
        self.panels.push(VersionPanel::new(VersionSlot::new(id, version_code)));
        id
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    pub fn panels(&self) -> &[VersionPanel] {
        &self.panels
    }

    pub fn get(&self, slot_id: SlotId) -> Option<&VersionPanel> {
        self.panels.iter().find(|p| p.slot.id == slot_id)
    }

    pub fn get_mut(&mut self, slot_id: SlotId) -> Option<&mut VersionPanel> {
        self.panels.iter_mut().find(|p| p.slot.id == slot_id)
    }

    pub fn slot_at(&self, index: usize) -> Option<SlotId> {
        self.panels.get(index).map(|p| p.slot.id)
    }

    pub fn add_slot(&mut self) -> PanelChange {
        if self.panels.len() >= MAX_PANELS {
            return PanelChange::Rejected(PanelRejection::TooManyPanels);
        }
        let version = self.default_version.clone();
        PanelChange::Added(self.push(&version))
    }

    pub fn remove_slot(&mut self, index: usize) -> PanelChange {
        if self.panels.len() <= 1 {
            return PanelChange::Rejected(PanelRejection::LastPanel);
        }
        if index >= self.panels.len() {
            return PanelChange::Rejected(PanelRejection::NoSuchPanel);
        }
        PanelChange::Removed(self.panels.remove(index).slot.id)
    }

    /// Swaps the version of one panel. The panel's next fetch uses the new key;
    /// no other panel is touched.
    pub fn change_slot_version(&mut self, index: usize, version_code: &str) -> PanelChange {
        let Some(panel) = self.panels.get_mut(index) else {
            return PanelChange::Rejected(PanelRejection::NoSuchPanel);
        };
        let id = panel.slot.id;
        panel.slot = VersionSlot::new(id, version_code);
        // Selected ids belong to the previous version's verse rows.
        panel.selection.clear();
        PanelChange::VersionChanged(id)
    }

    /// Points one panel at (book, chapter) with its own version and returns the
    /// fetch to run. A panel moving to a different key shows `Loading` until
    /// that fetch resolves.
    pub fn begin_fetch(&mut self, slot_id: SlotId, book_id: BookId, chapter_number: u32) -> Option<PanelFetch> {
        let panel = self.get_mut(slot_id)?;
        let key = VerseKey::new(book_id, chapter_number, &panel.slot.version_code);
        if panel.key.as_ref() != Some(&key) {
            panel.view = PanelView::Loading;
            panel.highlights = Arc::new(HighlightMap::new());
            panel.key = Some(key.clone());
        }
        panel.fetch_sequence += 1;
        Some(PanelFetch {
            slot_id,
            key,
            sequence: panel.fetch_sequence,
        })
    }

    /// Fetches for every panel, in panel order.
    pub fn begin_fetch_all(&mut self, book_id: BookId, chapter_number: u32) -> Vec<PanelFetch> {
        let ids: Vec<SlotId> = self.panels.iter().map(|p| p.slot.id).collect();
        ids.into_iter()
            .filter_map(|id| self.begin_fetch(id, book_id, chapter_number))
            .collect()
    }

    fn current_panel(&mut self, fetch: &PanelFetch) -> Option<&mut VersionPanel> {
        match self.get_mut(fetch.slot_id) {
            Some(panel) if panel.key.as_ref() == Some(&fetch.key) && panel.fetch_sequence == fetch.sequence => {
                Some(panel)
            }
            _ => {
                debug!(slot = %fetch.slot_id, key = %fetch.key, sequence = fetch.sequence, "Discarding superseded fetch result");
                None
            }
        }
    }

    /// Stores a fetch result if it belongs to the panel's latest dispatch.
    /// Returns false when the result was discarded.
    pub fn complete_fetch(&mut self, fetch: &PanelFetch, result: ReaderResult<Arc<Vec<Verse>>>) -> bool {
        let Some(panel) = self.current_panel(fetch) else {
            return false;
        };
        panel.view = match result {
            Ok(verses) => PanelView::Ready(verses),
            Err(e) => PanelView::Failed(e),
        };
        true
    }

    /// Stores a highlight overlay if it belongs to the panel's latest dispatch.
    pub fn complete_highlights(&mut self, fetch: &PanelFetch, highlights: Arc<HighlightMap>) -> bool {
        let Some(panel) = self.current_panel(fetch) else {
            return false;
        };
        panel.highlights = highlights;
        true
    }

    pub fn clear_selections(&mut self) {
        for panel in &mut self.panels {
            panel.selection.clear();
        }
    }
}
