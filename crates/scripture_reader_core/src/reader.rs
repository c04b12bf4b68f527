//! crates/scripture_reader_core/src/reader.rs
//!
//! The comparison reader: shared navigation, the version panels, and each
//! panel's selection, wired to one verse fetcher and one session context.
//!
//! State transitions are synchronous and hand back the store work they imply
//! ([`ReaderEffects`]). A host that owns the reader behind a lock runs that
//! work with [`run_fetch`] / [`run_bounds`] outside the lock and settles the
//! results afterwards; results for keys that moved on are discarded. Hosts
//! without that concern can call [`ReaderView::settle_effects`].

use crate::domain::{BookId, HighlightColor, SlotId, User, Verse, VerseId, VersionSlot};
use crate::error::{ReaderError, ReaderResult};
use crate::fetcher::{HighlightMap, VerseFetcher};
use crate::navigation::{BoundsRequest, NavigationSnapshot, NavigationState};
use crate::panels::{PanelChange, PanelFetch, PanelRejection, PanelSet, PanelView};
use crate::ports::PortResult;
use crate::selection::{self, HighlightCommand, HighlightProbe, SelectionPhase};
use crate::session::SessionContext;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Store work a transition asks for.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReaderEffects {
    pub bounds: Option<BoundsRequest>,
    pub fetches: Vec<PanelFetch>,
}

impl ReaderEffects {
    pub fn is_empty(&self) -> bool {
        self.bounds.is_none() && self.fetches.is_empty()
    }

    fn merge(&mut self, other: ReaderEffects) {
        if other.bounds.is_some() {
            self.bounds = other.bounds;
        }
        self.fetches.extend(other.fetches);
    }
}

/// What a panel fetch produced.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub verses: ReaderResult<Arc<Vec<Verse>>>,
    pub highlights: Option<Arc<HighlightMap>>,
}

/// A probe to run for one panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub slot_id: SlotId,
    pub probe: HighlightProbe,
}

/// A highlight action ready to run for one panel.
#[derive(Debug, Clone)]
pub struct HighlightRequest {
    pub slot_id: SlotId,
    pub user: User,
    pub command: HighlightCommand,
}

pub struct ReaderView {
    fetcher: Arc<VerseFetcher>,
    session: SessionContext,
    navigation: NavigationState,
    panels: PanelSet,
}

impl ReaderView {
    pub fn new(fetcher: Arc<VerseFetcher>, session: SessionContext, book_id: BookId, default_version: &str) -> Self {
        Self {
            fetcher,
            session,
            navigation: NavigationState::new(book_id),
            panels: PanelSet::new(default_version),
        }
    }

    pub fn fetcher(&self) -> &Arc<VerseFetcher> {
        &self.fetcher
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn navigation(&self) -> &NavigationState {
        &self.navigation
    }

    pub fn panels(&self) -> &PanelSet {
        &self.panels
    }

    /// Initial load: chapter bounds for the current book and every panel.
    pub fn open(&mut self) -> ReaderEffects {
        ReaderEffects {
            bounds: Some(self.navigation.bounds_request()),
            fetches: self.fetch_all(),
        }
    }

    fn fetch_all(&mut self) -> Vec<PanelFetch> {
        self.panels
            .begin_fetch_all(self.navigation.selected_book_id(), self.navigation.chapter_number())
    }

    //--- Navigation -----------------------------------------------------------

    pub fn select_book(&mut self, book_id: BookId) -> ReaderEffects {
        self.panels.clear_selections();
        let bounds = self.navigation.select_book(book_id);
        ReaderEffects {
            bounds: Some(bounds),
            fetches: self.fetch_all(),
        }
    }

    pub fn next_chapter(&mut self) -> ReaderEffects {
        self.panels.clear_selections();
        if self.navigation.next_chapter() {
            ReaderEffects { bounds: None, fetches: self.fetch_all() }
        } else {
            ReaderEffects::default()
        }
    }

    pub fn previous_chapter(&mut self) -> ReaderEffects {
        self.panels.clear_selections();
        if self.navigation.previous_chapter() {
            ReaderEffects { bounds: None, fetches: self.fetch_all() }
        } else {
            ReaderEffects::default()
        }
    }

    pub fn select_chapter(&mut self, chapter_number: u32) -> ReaderEffects {
        self.panels.clear_selections();
        if self.navigation.select_chapter(chapter_number) {
            ReaderEffects { bounds: None, fetches: self.fetch_all() }
        } else {
            ReaderEffects::default()
        }
    }

    /// Applies a bounds lookup. If that moved the chapter, every panel refetches.
    pub fn settle_bounds(&mut self, request: BoundsRequest, lookup: PortResult<Option<u32>>) -> ReaderEffects {
        let before = self.navigation.chapter_number();
        if !self.navigation.settle_bounds(request, lookup) || self.navigation.chapter_number() == before {
            return ReaderEffects::default();
        }
        self.panels.clear_selections();
        ReaderEffects { bounds: None, fetches: self.fetch_all() }
    }

    //--- Panels ---------------------------------------------------------------

    pub fn add_slot(&mut self) -> (PanelChange, ReaderEffects) {
        let change = self.panels.add_slot();
        let mut effects = ReaderEffects::default();
        if let PanelChange::Added(id) = change {
            effects.fetches.extend(self.begin_fetch(id));
        }
        (change, effects)
    }

    pub fn remove_slot(&mut self, index: usize) -> PanelChange {
        self.panels.remove_slot(index)
    }

    pub fn change_slot_version(&mut self, index: usize, version_code: &str) -> (PanelChange, ReaderEffects) {
        let change = self.panels.change_slot_version(index, version_code);
        let mut effects = ReaderEffects::default();
        if let PanelChange::VersionChanged(id) = change {
            effects.fetches.extend(self.begin_fetch(id));
        }
        (change, effects)
    }

    fn begin_fetch(&mut self, slot_id: SlotId) -> Option<PanelFetch> {
        self.panels.begin_fetch(slot_id, self.navigation.selected_book_id(), self.navigation.chapter_number())
    }

    /// Refetches every panel at its current key. Verse text comes from cache
    /// when fresh; highlight overlays are re-read if invalidated.
    pub fn refresh(&mut self) -> ReaderEffects {
        ReaderEffects { bounds: None, fetches: self.fetch_all() }
    }

    pub fn settle_fetch(&mut self, fetch: &PanelFetch, outcome: FetchOutcome) -> bool {
        let FetchOutcome { verses, highlights } = outcome;
        if !self.panels.complete_fetch(fetch, verses) {
            return false;
        }
        if let Some(map) = highlights {
            self.panels.complete_highlights(fetch, map);
        }
        true
    }

    //--- Selection and highlights ---------------------------------------------

    /// Toggles a verse in one panel's selection. Returns the highlight probe
    /// to run when the selection is non-empty afterwards.
    pub fn toggle_select(&mut self, slot_id: SlotId, verse_id: VerseId) -> Result<Option<ProbeRequest>, PanelRejection> {
        let panel = self.panels.get_mut(slot_id).ok_or(PanelRejection::NoSuchPanel)?;
        Ok(panel
            .selection
            .toggle(verse_id)
            .map(|probe| ProbeRequest { slot_id, probe }))
    }

    pub fn clear_selections(&mut self) {
        self.panels.clear_selections();
    }

    pub fn settle_probe(&mut self, request: &ProbeRequest, outcome: &ReaderResult<bool>) -> bool {
        match self.panels.get_mut(request.slot_id) {
            Some(panel) => panel.selection.settle_probe(&request.probe, outcome),
            None => false,
        }
    }

    /// Captures the selected verses of a panel for apply/remove.
    ///
    /// Fails with `Unauthenticated` when nobody is signed in, before any store
    /// call. Returns `Ok(None)` when the panel has nothing selected.
    pub fn highlight_request(&self, slot_id: SlotId) -> ReaderResult<Option<HighlightRequest>> {
        let user = self.session.current_user().ok_or(ReaderError::Unauthenticated)?;
        let Some(panel) = self.panels.get(slot_id) else {
            return Ok(None);
        };
        Ok(panel.selection.command().map(|command| HighlightRequest {
            slot_id,
            user,
            command,
        }))
    }

    /// Clears the panel's selection after a successful action; keeps it
    /// otherwise. On success the caller should also invalidate the highlight
    /// overlays and run the returned refresh.
    pub fn finish_highlight(&mut self, slot_id: SlotId, outcome: &ReaderResult<()>) -> ReaderEffects {
        if let Some(panel) = self.panels.get_mut(slot_id) {
            panel.selection.finish(outcome);
        }
        if outcome.is_ok() {
            self.refresh()
        } else {
            ReaderEffects::default()
        }
    }

    //--- Single-owner conveniences --------------------------------------------

    /// Runs `effects` against the store and settles every result. Panel
    /// fetches run concurrently.
    pub async fn settle_effects(&mut self, effects: ReaderEffects) {
        let mut pending = effects;
        while !pending.is_empty() {
            let ReaderEffects { bounds, fetches } = std::mem::take(&mut pending);
            let user = self.session.current_user();
            let fetcher = self.fetcher.clone();
            let outcomes = join_all(fetches.iter().map(|f| run_fetch(&fetcher, user.as_ref(), f))).await;
            for (fetch, outcome) in fetches.iter().zip(outcomes) {
                self.settle_fetch(fetch, outcome);
            }
            if let Some(request) = bounds {
                let lookup = run_bounds(&fetcher, request).await;
                pending.merge(self.settle_bounds(request, lookup));
            }
        }
    }

    pub async fn toggle_and_probe(&mut self, slot_id: SlotId, verse_id: VerseId) -> ReaderResult<()> {
        let Some(request) = self.toggle_select(slot_id, verse_id)? else {
            return Ok(());
        };
        let user = self.session.current_user();
        let outcome = selection::probe_highlights(self.fetcher.store().as_ref(), user.as_ref(), &request.probe).await;
        self.settle_probe(&request, &outcome);
        outcome.map(|_| ())
    }

    pub async fn apply_highlight(&mut self, slot_id: SlotId, color: HighlightColor) -> ReaderResult<()> {
        let Some(request) = self.highlight_request(slot_id)? else {
            return Ok(());
        };
        let outcome = run_apply(&self.fetcher, &request, color).await;
        let effects = self.finish_highlight(slot_id, &outcome);
        self.settle_effects(effects).await;
        outcome
    }

    pub async fn remove_highlight(&mut self, slot_id: SlotId) -> ReaderResult<()> {
        let Some(request) = self.highlight_request(slot_id)? else {
            return Ok(());
        };
        let outcome = run_remove(&self.fetcher, &request).await;
        let effects = self.finish_highlight(slot_id, &outcome);
        self.settle_effects(effects).await;
        outcome
    }

    //--- Rendering -------------------------------------------------------------

    pub fn snapshot(&self) -> ReaderSnapshot {
        ReaderSnapshot {
            navigation: self.navigation.snapshot(),
            authenticated: self.session.is_authenticated(),
            panels: (0..self.panels.len()).filter_map(|i| self.panel_snapshot_at(i)).collect(),
        }
    }

    pub fn panel_snapshot(&self, slot_id: SlotId) -> Option<PanelSnapshot> {
        let index = self.panels.panels().iter().position(|p| p.slot.id == slot_id)?;
        self.panel_snapshot_at(index)
    }

    fn panel_snapshot_at(&self, index: usize) -> Option<PanelSnapshot> {
        let panel = self.panels.panels().get(index)?;
        let selected = panel.selection.selected();
        let status = match &panel.view {
            PanelView::Loading => PanelStatus::Loading,
            PanelView::Ready(verses) => PanelStatus::Ready {
                verses: verses
                    .iter()
                    .map(|v| VerseView {
                        id: v.id,
                        verse_number: v.verse_number,
                        text: v.text.clone(),
                        highlight: panel.highlights.get(&v.id).copied(),
                        selected: selected.contains(&v.id),
                    })
                    .collect(),
            },
            PanelView::Failed(e) => PanelStatus::Failed {
                message: e.user_message(),
                inline: e.is_inline(),
            },
        };
        Some(PanelSnapshot {
            index,
            slot: panel.slot.clone(),
            status,
            selection: SelectionSnapshot {
                phase: panel.selection.phase(),
                verse_ids: selected.iter().copied().collect(),
                already_highlighted: panel.selection.already_highlighted(),
            },
        })
    }
}

/// Fetches one panel's verses and, for a signed-in user, its highlight overlay.
pub async fn run_fetch(fetcher: &VerseFetcher, user: Option<&User>, fetch: &PanelFetch) -> FetchOutcome {
    let verses = fetcher.fetch_verses(&fetch.key).await;
    let highlights = match (&verses, user) {
        (Ok(list), Some(user)) => match fetcher.fetch_highlights(user.user_id, list).await {
            Ok(map) => Some(map),
            Err(e) => {
                warn!(slot = %fetch.slot_id, error = %e, "Highlight overlay unavailable");
                None
            }
        },
        (Ok(_), None) => Some(Arc::new(HighlightMap::new())),
        (Err(_), _) => None,
    };
    FetchOutcome { verses, highlights }
}

pub async fn run_bounds(fetcher: &VerseFetcher, request: BoundsRequest) -> PortResult<Option<u32>> {
    fetcher.store().get_max_chapter_number(request.book_id).await
}

pub async fn run_probe(fetcher: &VerseFetcher, user: Option<&User>, request: &ProbeRequest) -> ReaderResult<bool> {
    selection::probe_highlights(fetcher.store().as_ref(), user, &request.probe).await
}

/// Applies `color` and, on success, invalidates every highlight overlay.
pub async fn run_apply(fetcher: &VerseFetcher, request: &HighlightRequest, color: HighlightColor) -> ReaderResult<()> {
    selection::apply_highlight(fetcher.store().as_ref(), Some(&request.user), &request.command, color).await?;
    fetcher.invalidate_highlights();
    info!(slot = %request.slot_id, %color, "Highlight applied");
    Ok(())
}

/// Removes highlights and, on success, invalidates every highlight overlay.
pub async fn run_remove(fetcher: &VerseFetcher, request: &HighlightRequest) -> ReaderResult<()> {
    selection::remove_highlight(fetcher.store().as_ref(), Some(&request.user), &request.command).await?;
    fetcher.invalidate_highlights();
    info!(slot = %request.slot_id, "Highlight removed");
    Ok(())
}

//=========================================================================================
// Render Snapshots
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReaderSnapshot {
    pub navigation: NavigationSnapshot,
    pub authenticated: bool,
    pub panels: Vec<PanelSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelSnapshot {
    pub index: usize,
    pub slot: VersionSlot,
    pub status: PanelStatus,
    pub selection: SelectionSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PanelStatus {
    Loading,
    Ready { verses: Vec<VerseView> },
    Failed { message: String, inline: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerseView {
    pub id: VerseId,
    pub verse_number: u32,
    pub text: String,
    pub highlight: Option<HighlightColor>,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionSnapshot {
    pub phase: SelectionPhase,
    pub verse_ids: Vec<VerseId>,
    pub already_highlighted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::ports::AuthEvent;
    use uuid::Uuid;

    fn reader(user: Option<User>) -> (Arc<InMemoryStore>, ReaderView) {
        let store = Arc::new(InMemoryStore::with_sample());
        let fetcher = Arc::new(VerseFetcher::new(store.clone()));
        let view = ReaderView::new(fetcher, SessionContext::new(user), 1, "ACF");
        (store, view)
    }

    fn signed_in() -> User {
        User { user_id: Uuid::new_v4(), email: None }
    }

    fn ready_verses(snapshot: &PanelSnapshot) -> &[VerseView] {
        match &snapshot.status {
            PanelStatus::Ready { verses } => verses,
            other => panic!("panel not ready: {:?}", other),
        }
    }

    #[tokio::test]
    async fn genesis_one_compares_acf_with_missing_version() {
        let (_, mut view) = reader(None);
        let effects = view.open();
        view.settle_effects(effects).await;
        let (_, effects) = view.add_slot();
        view.settle_effects(effects).await;
        let (_, effects) = view.change_slot_version(1, "XYZ");
        view.settle_effects(effects).await;

        let snapshot = view.snapshot();
        assert_eq!(snapshot.navigation.max_chapters, 50);
        let acf = ready_verses(&snapshot.panels[0]);
        assert_eq!(acf.iter().map(|v| v.verse_number).collect::<Vec<_>>(), (1..=31).collect::<Vec<u32>>());
        match &snapshot.panels[1].status {
            PanelStatus::Failed { message, inline } => {
                assert!(*inline);
                assert!(message.contains("isn't available yet"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn navigation_clears_every_panel_selection() {
        let (_, mut view) = reader(Some(signed_in()));
        let effects = view.open();
        view.settle_effects(effects).await;
        let (_, effects) = view.add_slot();
        view.settle_effects(effects).await;

        let first = view.panels().slot_at(0).unwrap();
        let second = view.panels().slot_at(1).unwrap();
        let verse = view.panels().get(first).unwrap().verses().unwrap()[2].id;
        view.toggle_and_probe(first, verse).await.unwrap();
        view.toggle_and_probe(second, verse).await.unwrap();

        let effects = view.next_chapter();
        assert_eq!(view.navigation().chapter_number(), 2);
        assert!(view.panels().panels().iter().all(|p| p.selection.is_empty()));
        view.settle_effects(effects).await;

        view.toggle_and_probe(first, verse).await.unwrap();
        let effects = view.select_book(43);
        assert!(view.panels().panels().iter().all(|p| p.selection.is_empty()));
        view.settle_effects(effects).await;
        assert_eq!(view.navigation().max_chapters(), 21);
    }

    #[tokio::test]
    async fn selections_are_scoped_per_panel() {
        let (_, mut view) = reader(None);
        let effects = view.open();
        view.settle_effects(effects).await;
        view.add_slot();
        let first = view.panels().slot_at(0).unwrap();
        let second = view.panels().slot_at(1).unwrap();

        assert!(view.toggle_select(first, 1).unwrap().is_some());
        assert!(view.panels().get(second).unwrap().selection.is_empty());
        assert_eq!(view.toggle_select(SlotId(99), 1), Err(PanelRejection::NoSuchPanel));
    }

    #[tokio::test]
    async fn highlight_round_trip_updates_overlay() {
        let user = signed_in();
        let (store, mut view) = reader(Some(user.clone()));
        let effects = view.open();
        view.settle_effects(effects).await;
        let slot = view.panels().slot_at(0).unwrap();
        let verse = view.panels().get(slot).unwrap().verses().unwrap()[0].id;

        view.toggle_and_probe(slot, verse).await.unwrap();
        view.apply_highlight(slot, HighlightColor::Yellow).await.unwrap();
        let panel = view.panel_snapshot(slot).unwrap();
        assert_eq!(panel.selection.phase, SelectionPhase::Idle);
        assert_eq!(ready_verses(&panel)[0].highlight, Some(HighlightColor::Yellow));

        view.toggle_and_probe(slot, verse).await.unwrap();
        assert!(view.panel_snapshot(slot).unwrap().selection.already_highlighted);
        view.apply_highlight(slot, HighlightColor::Blue).await.unwrap();
        let rows = store.highlight_rows(verse, user.user_id);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].color, HighlightColor::Blue);

        view.toggle_and_probe(slot, verse).await.unwrap();
        view.remove_highlight(slot).await.unwrap();
        let panel = view.panel_snapshot(slot).unwrap();
        assert_eq!(ready_verses(&panel)[0].highlight, None);
        assert!(store.highlight_rows(verse, user.user_id).is_empty());
    }

    #[tokio::test]
    async fn signed_out_apply_is_rejected_before_any_write() {
        let (store, mut view) = reader(None);
        let effects = view.open();
        view.settle_effects(effects).await;
        let slot = view.panels().slot_at(0).unwrap();
        view.toggle_select(slot, 1).unwrap();

        let err = view.apply_highlight(slot, HighlightColor::Green).await.unwrap_err();
        assert_eq!(err, ReaderError::Unauthenticated);
        assert_eq!(store.write_count(), 0);
        assert_eq!(view.panels().get(slot).unwrap().selection.selected().len(), 1);

        view.session().apply(AuthEvent::SignedIn(signed_in()));
        assert!(view.apply_highlight(slot, HighlightColor::Green).await.is_ok());
    }

    #[tokio::test]
    async fn failed_apply_keeps_selection_for_retry() {
        let (store, mut view) = reader(Some(signed_in()));
        let effects = view.open();
        view.settle_effects(effects).await;
        let slot = view.panels().slot_at(0).unwrap();
        view.toggle_and_probe(slot, 1).await.unwrap();

        store.fail_operation("insert_highlight");
        let err = view.apply_highlight(slot, HighlightColor::Green).await.unwrap_err();
        assert!(matches!(err, ReaderError::Store { .. }));
        assert_eq!(view.panels().get(slot).unwrap().selection.selected().len(), 1);

        store.clear_failures();
        view.apply_highlight(slot, HighlightColor::Green).await.unwrap();
        assert!(view.panels().get(slot).unwrap().selection.is_empty());
    }

    #[tokio::test]
    async fn version_switch_result_wins_over_earlier_fetch() {
        let (_, mut view) = reader(None);
        let effects = view.open();
        let acf_fetch = effects.fetches[0].clone();
        let (_, switch) = view.change_slot_version(0, "KJV");
        let kjv_fetch = switch.fetches[0].clone();

        let fetcher = view.fetcher().clone();
        let kjv = run_fetch(&fetcher, None, &kjv_fetch).await;
        let acf = run_fetch(&fetcher, None, &acf_fetch).await;
        assert!(view.settle_fetch(&kjv_fetch, kjv));
        assert!(!view.settle_fetch(&acf_fetch, acf));

        let slot = view.panels().slot_at(0).unwrap();
        let verses = view.panels().get(slot).unwrap().verses().unwrap();
        assert!(verses.iter().all(|v| v.version == "KJV"));
    }

    #[tokio::test]
    async fn older_refresh_cannot_hide_a_newer_highlight() {
        let user = signed_in();
        let (store, mut view) = reader(Some(user.clone()));
        let effects = view.open();
        view.settle_effects(effects).await;
        let slot = view.panels().slot_at(0).unwrap();
        let verse = view.panels().get(slot).unwrap().verses().unwrap()[0].id;
        let fetcher = view.fetcher().clone();

        let older = view.refresh().fetches[0].clone();
        let stale = run_fetch(&fetcher, Some(&user), &older).await;

        store.seed_highlight(verse, user.user_id, HighlightColor::Green);
        fetcher.invalidate_highlights();
        let newer = view.refresh().fetches[0].clone();
        assert_eq!(older.key, newer.key);
        let fresh = run_fetch(&fetcher, Some(&user), &newer).await;

        assert!(view.settle_fetch(&newer, fresh));
        assert!(!view.settle_fetch(&older, stale));
        let panel = view.panel_snapshot(slot).unwrap();
        assert_eq!(ready_verses(&panel)[0].highlight, Some(HighlightColor::Green));
    }

    #[tokio::test]
    async fn toggling_in_a_missing_panel_is_reported() {
        let (store, mut view) = reader(Some(signed_in()));
        let effects = view.open();
        view.settle_effects(effects).await;

        let err = view.toggle_and_probe(SlotId(99), 1).await.unwrap_err();
        assert_eq!(err, ReaderError::Panel(PanelRejection::NoSuchPanel));
        assert_eq!(err.user_message(), "No such panel");
        assert_eq!(store.write_count(), 0);
    }
}
