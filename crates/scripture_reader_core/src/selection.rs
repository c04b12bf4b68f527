//! crates/scripture_reader_core/src/selection.rs
//!
//! Per-panel verse selection and the highlight mutation protocol.
//!
//! A panel is `Idle` with nothing selected and `Selecting` otherwise. Every
//! change that leaves the selection non-empty yields a [`HighlightProbe`]
//! which tells whether the user already has highlights on the selection.
//! Apply and remove run against a [`HighlightCommand`] snapshot; the
//! selection is only cleared once the store calls succeed.

use crate::domain::{HighlightColor, User, VerseId};
use crate::error::{ReaderError, ReaderResult};
use crate::ports::ScriptureStore;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

pub type SelectionSet = BTreeSet<VerseId>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPhase {
    Idle,
    Selecting,
}

/// Highlight-status check for a snapshot of the selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightProbe {
    pub verse_ids: Vec<VerseId>,
    generation: u64,
}

/// The verses an apply or remove acts on, captured when the action starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightCommand {
    pub verse_ids: Vec<VerseId>,
    /// Existing rows must be deleted before inserting.
    pub replace_existing: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    selected: SelectionSet,
    already_highlighted: bool,
    probe_settled: bool,
    generation: u64,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SelectionPhase {
        if self.selected.is_empty() {
            SelectionPhase::Idle
        } else {
            SelectionPhase::Selecting
        }
    }

    pub fn selected(&self) -> &SelectionSet {
        &self.selected
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn already_highlighted(&self) -> bool {
        self.already_highlighted
    }

    /// Adds `verse_id` if absent, removes it if present. Returns the probe to
    /// run when the selection is still non-empty.
    pub fn toggle(&mut self, verse_id: VerseId) -> Option<HighlightProbe> {
        if !self.selected.remove(&verse_id) {
            self.selected.insert(verse_id);
        }
        self.changed()
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.changed();
    }

    fn changed(&mut self) -> Option<HighlightProbe> {
        self.generation += 1;
        self.probe_settled = false;
        if self.selected.is_empty() {
            self.already_highlighted = false;
            return None;
        }
        Some(HighlightProbe {
            verse_ids: self.selected.iter().copied().collect(),
            generation: self.generation,
        })
    }

    /// Records a probe outcome if the selection has not moved on since.
    /// A failed probe leaves the state as it was.
    pub fn settle_probe(&mut self, probe: &HighlightProbe, outcome: &ReaderResult<bool>) -> bool {
        if probe.generation != self.generation {
            debug!("Discarding highlight probe for a superseded selection");
            return false;
        }
        match outcome {
            Ok(highlighted) => {
                self.already_highlighted = *highlighted;
                self.probe_settled = true;
                true
            }
            Err(_) => false,
        }
    }

    /// Snapshot for apply/remove, or `None` while idle.
    ///
    /// If the probe has not settled yet the command still replaces existing
    /// rows, so a fast click cannot leave two colors on one verse.
    pub fn command(&self) -> Option<HighlightCommand> {
        if self.selected.is_empty() {
            return None;
        }
        Some(HighlightCommand {
            verse_ids: self.selected.iter().copied().collect(),
            replace_existing: self.already_highlighted || !self.probe_settled,
        })
    }

    /// Clears the selection after a successful apply/remove. Failures keep
    /// it so the user can retry.
    pub fn finish(&mut self, outcome: &ReaderResult<()>) {
        if outcome.is_ok() {
            self.clear();
        }
    }
}

/// Whether `user` has any highlight row on any probed verse.
pub async fn probe_highlights(
    store: &dyn ScriptureStore,
    user: Option<&User>,
    probe: &HighlightProbe,
) -> ReaderResult<bool> {
    let Some(user) = user else {
        return Ok(false);
    };
    for &verse_id in &probe.verse_ids {
        let found = store
            .get_highlight(verse_id, user.user_id)
            .await
            .map_err(|e| ReaderError::store("get_highlight", format!("verse={} user={}", verse_id, user.user_id), e))?;
        if found.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Writes one `color` row per verse, deleting existing rows first when the
/// command asks for it. All deletes finish before the first insert.
pub async fn apply_highlight(
    store: &dyn ScriptureStore,
    user: Option<&User>,
    command: &HighlightCommand,
    color: HighlightColor,
) -> ReaderResult<()> {
    let user = user.ok_or(ReaderError::Unauthenticated)?;
    if command.replace_existing {
        delete_all(store, user, &command.verse_ids).await?;
    }
    for &verse_id in &command.verse_ids {
        store
            .insert_highlight(verse_id, user.user_id, color)
            .await
            .map_err(|e| {
                ReaderError::store(
                    "insert_highlight",
                    format!("verse={} user={} color={}", verse_id, user.user_id, color),
                    e,
                )
            })?;
    }
    info!(user_id = %user.user_id, verses = command.verse_ids.len(), %color, "Applied highlight");
    Ok(())
}

/// Deletes every highlight row the user has on the command's verses.
pub async fn remove_highlight(
    store: &dyn ScriptureStore,
    user: Option<&User>,
    command: &HighlightCommand,
) -> ReaderResult<()> {
    let user = user.ok_or(ReaderError::Unauthenticated)?;
    delete_all(store, user, &command.verse_ids).await?;
    info!(user_id = %user.user_id, verses = command.verse_ids.len(), "Removed highlights");
    Ok(())
}

async fn delete_all(store: &dyn ScriptureStore, user: &User, verse_ids: &[VerseId]) -> ReaderResult<()> {
    for &verse_id in verse_ids {
        let removed = store
            .delete_highlights(verse_id, user.user_id)
            .await
            .map_err(|e| {
                ReaderError::store("delete_highlights", format!("verse={} user={}", verse_id, user.user_id), e)
            })?;
        debug!(verse_id, removed, "Deleted highlight rows");
    }
    Ok(())
}
