//! The single owner of what is on screen.
//!
//! A [`ViewSession`] holds the query, the active subset, the open entries and
//! the breadcrumb. Everything else is recomputed from the immutable
//! [`Collection`] through the pure resolvers. Each operation returns the
//! [`ViewEvent`]s a renderer needs to apply.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::index::{EntryIndex, FacetCatalogue, LetterPartition};
use crate::prefs::PreferenceStore;
use crate::query::{Query, Subset, resolve};
use crate::route::{Breadcrumb, RouteIntent, parse, reconcile};
use crate::{Collection, Entry, EntryId, FacetKind, LoadError, LoadOptions};

const THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Light,
    Dark,
}

impl DisplayMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayMode::Light => "light",
            DisplayMode::Dark => "dark",
        }
    }

    fn from_pref(value: Option<String>) -> Self {
        match value.as_deref() {
            Some("dark") => DisplayMode::Dark,
            _ => DisplayMode::Light,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            DisplayMode::Light => DisplayMode::Dark,
            DisplayMode::Dark => DisplayMode::Light,
        }
    }
}

/// How many entries may be open at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpansionPolicy {
    /// Opening an entry closes the previously open one.
    #[default]
    Single,
    Multiple,
}

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub expansion: ExpansionPolicy,
}

/// Where the location token lives (the URL fragment in a browser).
///
/// The host calls [`ViewSession::on_location_change`] when the token changes
/// from outside; the session calls `publish` when it changes it.
pub trait LocationChannel {
    fn current(&self) -> String;
    fn publish(&mut self, token: &str);
}

/// In-memory location with a back/forward history.
#[derive(Debug, Clone)]
pub struct MemoryLocation {
    history: Vec<String>,
    cursor: usize,
}

impl MemoryLocation {
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            history: vec![initial.into()],
            cursor: 0,
        }
    }

    /// Steps back; returns the token to hand to the session.
    pub fn back(&mut self) -> Option<String> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        Some(self.current())
    }

    pub fn forward(&mut self) -> Option<String> {
        if self.cursor + 1 >= self.history.len() {
            return None;
        }
        self.cursor += 1;
        Some(self.current())
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }
}

impl Default for MemoryLocation {
    fn default() -> Self {
        Self::new("")
    }
}

impl LocationChannel for MemoryLocation {
    fn current(&self) -> String {
        self.history[self.cursor].clone()
    }

    fn publish(&mut self, token: &str) {
        if self.history[self.cursor] == token {
            return;
        }
        self.history.truncate(self.cursor + 1);
        self.history.push(token.to_string());
        self.cursor += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ViewState {
    Browsing,
    EntryFocused { id: EntryId },
    FacetFocused { facet: FacetKind, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// The active subset changed; re-read it from the session.
    Render { count: usize },
    Expand(EntryId),
    Collapse(EntryId),
    ScrollTo(EntryId),
    Breadcrumb(Option<Breadcrumb>),
    /// The session published a new location token.
    Location(String),
    DisplayMode(DisplayMode),
    Unavailable(String),
}

struct Loaded {
    collection: Arc<Collection>,
    index: EntryIndex,
    active: Subset,
    partition: LetterPartition,
    state: ViewState,
    query: Query,
    expanded: Vec<usize>,
    breadcrumb: Option<Breadcrumb>,
    published: String,
}

enum Phase {
    Loading,
    Ready(Box<Loaded>),
    Unavailable(String),
}

pub struct ViewSession<P, L> {
    config: SessionConfig,
    prefs: P,
    location: L,
    display_mode: DisplayMode,
    phase: Phase,
}

impl<P: PreferenceStore, L: LocationChannel> ViewSession<P, L> {
    pub fn new(config: SessionConfig, prefs: P, location: L) -> Self {
        let display_mode = DisplayMode::from_pref(prefs.get(THEME_KEY));
        Self {
            config,
            prefs,
            location,
            display_mode,
            phase: Phase::Loading,
        }
    }

    /// Opens `path` and hands the result to [`finish_load`](Self::finish_load).
    pub fn load(&mut self, path: impl AsRef<Path>, options: &LoadOptions) -> Vec<ViewEvent> {
        let result = Collection::open(path, options).map(|(collection, _)| collection);
        self.finish_load(result.map(Arc::new))
    }

    /// Completes the one-time load.
    ///
    /// Success shows the full collection and then applies the current
    /// location token. Failure is permanent for this session.
    pub fn finish_load(&mut self, result: Result<Arc<Collection>, LoadError>) -> Vec<ViewEvent> {
        if !matches!(self.phase, Phase::Loading) {
            warn!("Ignoring dictionary load for an already initialised session");
            return Vec::new();
        }
        let collection = match result {
            Ok(collection) => collection,
            Err(err) => {
                error!(error = %err, "Dictionary failed to load");
                let reason = err.to_string();
                self.phase = Phase::Unavailable(reason.clone());
                return vec![ViewEvent::Unavailable(reason)];
            }
        };

        let index = EntryIndex::build(&collection);
        let active = Subset::all(&collection);
        let partition = index.partition.clone();
        let count = active.len();
        self.phase = Phase::Ready(Box::new(Loaded {
            collection,
            index,
            active,
            partition,
            state: ViewState::Browsing,
            query: Query::default(),
            expanded: Vec::new(),
            breadcrumb: None,
            published: String::new(),
        }));

        let mut events = vec![ViewEvent::Render { count }];
        let token = self.location.current();
        events.extend(self.on_location_change(&token));
        events
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.phase, Phase::Ready(_))
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.phase {
            Phase::Unavailable(reason) => Some(reason),
            _ => None,
        }
    }

    /// New free text; supersedes any link focus.
    pub fn set_query(&mut self, text: &str) -> Vec<ViewEvent> {
        let Some(loaded) = self.loaded_mut() else {
            return Vec::new();
        };
        loaded.query.text = text.to_string();
        self.refilter()
    }

    /// Picks (`Some`) or clears (`None`) the value for one facet selector.
    pub fn select_facet(&mut self, kind: FacetKind, value: Option<&str>) -> Vec<ViewEvent> {
        let Some(loaded) = self.loaded_mut() else {
            return Vec::new();
        };
        match value.filter(|v| !v.is_empty()) {
            Some(value) => loaded.query.facets.insert(kind, value.to_string()),
            None => loaded.query.facets.remove(&kind),
        };
        self.refilter()
    }

    /// Scroll target for a letter of the jump bar. Never changes the subset.
    pub fn jump_to_letter(&self, letter: char) -> Vec<ViewEvent> {
        let Some(loaded) = self.loaded() else {
            return Vec::new();
        };
        loaded
            .partition
            .first_in(letter)
            .and_then(|pos| loaded.collection.get(pos))
            .map(|entry| vec![ViewEvent::ScrollTo(entry.id().clone())])
            .unwrap_or_default()
    }

    /// Applies a location token that changed outside the session
    /// (initial load, back/forward, a pasted link).
    pub fn on_location_change(&mut self, token: &str) -> Vec<ViewEvent> {
        let Some(loaded) = self.loaded_mut() else {
            return Vec::new();
        };
        if loaded.published == token {
            return Vec::new();
        }
        loaded.published = token.to_string();
        self.apply_intent(parse(token))
    }

    /// In-page link click: route the link, then publish its canonical token
    /// if it focused something (otherwise the empty token).
    pub fn follow_link(&mut self, token: &str) -> Vec<ViewEvent> {
        if !self.is_ready() {
            return Vec::new();
        }
        let intent = parse(token);
        let canonical = intent.token();
        let mut events = self.apply_intent(intent);
        // A link that degraded to the unfocused list must not leave its token behind.
        let published = if self.breadcrumb().is_some() {
            canonical
        } else {
            String::new()
        };
        events.extend(self.publish(&published));
        events
    }

    /// "Back to dictionary": clear everything and show the full collection.
    pub fn back_to_dictionary(&mut self) -> Vec<ViewEvent> {
        let Some(loaded) = self.loaded_mut() else {
            return Vec::new();
        };
        loaded.query = Query::default();
        self.refilter()
    }

    /// Opens an entry of the active subset. While an entry is focused the
    /// focus and breadcrumb move to the newly opened one.
    pub fn expand_entry(&mut self, id: &EntryId) -> Vec<ViewEvent> {
        let policy = self.config.expansion;
        let Some(loaded) = self.loaded_mut() else {
            return Vec::new();
        };
        let Some(pos) = loaded.collection.position(id) else {
            return Vec::new();
        };
        if !loaded.active.contains(pos) || loaded.expanded.contains(&pos) {
            return Vec::new();
        }
        let mut events = Vec::new();
        if policy == ExpansionPolicy::Single {
            events.extend(loaded.collapse_all());
        }
        loaded.expanded.push(pos);
        events.push(ViewEvent::Expand(id.clone()));
        if matches!(&loaded.state, ViewState::EntryFocused { id: focused } if focused != id) {
            let intent = RouteIntent::ShowEntry { id: id.clone() };
            let breadcrumb = loaded.collection.get(pos).map(|entry| Breadcrumb {
                intent,
                label: entry.headword().to_string(),
            });
            loaded.state = ViewState::EntryFocused { id: id.clone() };
            loaded.breadcrumb = breadcrumb.clone();
            events.push(ViewEvent::Breadcrumb(breadcrumb));
        }
        let token = RouteIntent::ShowEntry { id: id.clone() }.token();
        events.extend(self.publish(&token));
        events
    }

    pub fn collapse_entry(&mut self, id: &EntryId) -> Vec<ViewEvent> {
        let Some(loaded) = self.loaded_mut() else {
            return Vec::new();
        };
        let Some(pos) = loaded.collection.position(id) else {
            return Vec::new();
        };
        let before = loaded.expanded.len();
        loaded.expanded.retain(|open| *open != pos);
        if loaded.expanded.len() == before {
            return Vec::new();
        }
        vec![ViewEvent::Collapse(id.clone())]
    }

    pub fn toggle_entry(&mut self, id: &EntryId) -> Vec<ViewEvent> {
        if self.expanded().contains(&id) {
            self.collapse_entry(id)
        } else {
            self.expand_entry(id)
        }
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) -> Vec<ViewEvent> {
        self.display_mode = mode;
        if let Err(err) = self.prefs.set(THEME_KEY, mode.as_str()) {
            warn!(error = %err, "failed to persist display mode");
        }
        vec![ViewEvent::DisplayMode(mode)]
    }

    pub fn toggle_display_mode(&mut self) -> Vec<ViewEvent> {
        self.set_display_mode(self.display_mode.toggled())
    }

    pub fn state(&self) -> Option<&ViewState> {
        self.loaded().map(|loaded| &loaded.state)
    }

    pub fn query(&self) -> Option<&Query> {
        self.loaded().map(|loaded| &loaded.query)
    }

    pub fn breadcrumb(&self) -> Option<&Breadcrumb> {
        self.loaded().and_then(|loaded| loaded.breadcrumb.as_ref())
    }

    pub fn collection(&self) -> Option<&Arc<Collection>> {
        self.loaded().map(|loaded| &loaded.collection)
    }

    pub fn active_subset(&self) -> Option<&Subset> {
        self.loaded().map(|loaded| &loaded.active)
    }

    /// Entries currently listed, in display order.
    pub fn active_entries(&self) -> Vec<&Entry> {
        self.loaded()
            .map(|loaded| loaded.active.entries(&loaded.collection).collect())
            .unwrap_or_default()
    }

    /// Letter partition of the active subset.
    pub fn partition(&self) -> Option<&LetterPartition> {
        self.loaded().map(|loaded| &loaded.partition)
    }

    /// Facet options; always from the full collection.
    pub fn catalogue(&self) -> Option<&FacetCatalogue> {
        self.loaded().map(|loaded| &loaded.index.catalogue)
    }

    pub fn expanded(&self) -> Vec<&EntryId> {
        self.loaded()
            .map(|loaded| {
                loaded
                    .expanded
                    .iter()
                    .filter_map(|pos| loaded.collection.get(*pos))
                    .map(Entry::id)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn location(&self) -> &L {
        &self.location
    }

    pub fn location_mut(&mut self) -> &mut L {
        &mut self.location
    }

    pub fn prefs(&self) -> &P {
        &self.prefs
    }

    fn loaded(&self) -> Option<&Loaded> {
        match &self.phase {
            Phase::Ready(loaded) => Some(loaded),
            _ => None,
        }
    }

    fn loaded_mut(&mut self) -> Option<&mut Loaded> {
        match &mut self.phase {
            Phase::Ready(loaded) => Some(loaded),
            _ => None,
        }
    }

    /// Re-resolves the current query and returns to `Browsing`.
    fn refilter(&mut self) -> Vec<ViewEvent> {
        let Some(loaded) = self.loaded_mut() else {
            return Vec::new();
        };
        let active = resolve(&loaded.collection, &loaded.query);
        debug!(query = %loaded.query.text, facets = loaded.query.facets.len(), matches = active.len(), "Filtered dictionary");
        let mut events = loaded.show(active, ViewState::Browsing, None);
        events.extend(self.publish(""));
        events
    }

    fn apply_intent(&mut self, intent: RouteIntent) -> Vec<ViewEvent> {
        let Some(loaded) = self.loaded_mut() else {
            return Vec::new();
        };
        debug!(%intent, "Applying route");
        if intent == RouteIntent::None && loaded.state == ViewState::Browsing {
            return Vec::new();
        }

        let outcome = reconcile(&intent, &loaded.collection, &loaded.index);
        let state = match (&intent, &outcome.breadcrumb) {
            (RouteIntent::ShowEntry { id }, Some(_)) => ViewState::EntryFocused { id: id.clone() },
            (RouteIntent::ShowFacet { facet, value }, Some(_)) => ViewState::FacetFocused {
                facet: *facet,
                value: value.clone(),
            },
            _ => ViewState::Browsing,
        };
        loaded.query = Query::default();
        let mut events = loaded.show(outcome.subset, state, outcome.breadcrumb);
        if let Some(pos) = outcome.expand {
            if let Some(entry) = loaded.collection.get(pos) {
                let id = entry.id().clone();
                loaded.expanded.push(pos);
                events.push(ViewEvent::Expand(id.clone()));
                events.push(ViewEvent::ScrollTo(id));
            }
        }
        events
    }

    fn publish(&mut self, token: &str) -> Vec<ViewEvent> {
        let Some(loaded) = self.loaded_mut() else {
            return Vec::new();
        };
        if loaded.published == token {
            return Vec::new();
        }
        loaded.published = token.to_string();
        self.location.publish(token);
        vec![ViewEvent::Location(token.to_string())]
    }
}

impl Loaded {
    /// Swaps in a new subset, closing whatever was open.
    fn show(
        &mut self,
        active: Subset,
        state: ViewState,
        breadcrumb: Option<Breadcrumb>,
    ) -> Vec<ViewEvent> {
        let mut events = self.collapse_all();
        self.partition = LetterPartition::build(&self.collection, &active);
        self.active = active;
        self.state = state;
        if self.breadcrumb != breadcrumb {
            self.breadcrumb = breadcrumb.clone();
            events.push(ViewEvent::Breadcrumb(breadcrumb));
        }
        events.push(ViewEvent::Render {
            count: self.active.len(),
        });
        events
    }

    fn collapse_all(&mut self) -> Vec<ViewEvent> {
        self.expanded
            .drain(..)
            .filter_map(|pos| self.collection.get(pos))
            .map(|entry| ViewEvent::Collapse(entry.id().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::MemoryPreferences;

    type TestSession = ViewSession<MemoryPreferences, MemoryLocation>;

    fn dictionary() -> Collection {
        Collection::new(vec![
            Entry::new("abetare").with_facet(FacetKind::MorphClass, "emër"),
            Entry::new("abonoj").with_facet(FacetKind::MorphClass, "folje"),
            Entry::new("çelës").with_facet(FacetKind::MorphClass, "emër"),
            Entry::new("dal").with_facet(FacetKind::MorphClass, "folje"),
            Entry::new("ëndërr")
                .with_facet(FacetKind::MorphClass, "emër")
                .with_facet(FacetKind::Neologism, "jo"),
        ])
    }

    fn ready(initial: &str) -> (TestSession, Vec<ViewEvent>) {
        ready_with(initial, SessionConfig::default())
    }

    fn ready_with(initial: &str, config: SessionConfig) -> (TestSession, Vec<ViewEvent>) {
        let mut session = ViewSession::new(
            config,
            MemoryPreferences::default(),
            MemoryLocation::new(initial),
        );
        let events = session.finish_load(Ok(Arc::new(dictionary())));
        (session, events)
    }

    fn shown(session: &TestSession) -> Vec<&str> {
        session.active_entries().into_iter().map(Entry::headword).collect()
    }

    fn id(word: &str) -> EntryId {
        EntryId::new(word)
    }

    #[test]
    fn operations_are_noops_until_loaded() {
        let mut session: TestSession = ViewSession::new(
            SessionConfig::default(),
            MemoryPreferences::default(),
            MemoryLocation::default(),
        );
        assert!(session.set_query("ab").is_empty());
        assert!(session.on_location_change("entry/dal").is_empty());
        assert!(session.jump_to_letter('a').is_empty());
        assert!(session.state().is_none());
        assert!(!session.is_ready());
    }

    #[test]
    fn failed_load_is_permanent() {
        let mut session: TestSession = ViewSession::new(
            SessionConfig::default(),
            MemoryPreferences::default(),
            MemoryLocation::default(),
        );
        let events = session.finish_load(Err(LoadError::NotACollection));
        assert!(matches!(events.as_slice(), [ViewEvent::Unavailable(_)]));
        assert!(session.unavailable_reason().is_some());
        assert!(session.finish_load(Ok(Arc::new(dictionary()))).is_empty());
        assert!(session.set_query("a").is_empty());
    }

    #[test]
    fn starts_browsing_everything() {
        let (session, events) = ready("");
        assert_eq!(events, vec![ViewEvent::Render { count: 5 }]);
        assert_eq!(session.state(), Some(&ViewState::Browsing));
        assert_eq!(shown(&session).len(), 5);
        assert!(session.breadcrumb().is_none());
    }

    #[test]
    fn initial_entry_link_is_applied_after_first_render() {
        let (session, events) = ready("#entry/celes");
        assert_eq!(events.first(), Some(&ViewEvent::Render { count: 5 }));
        assert!(events.contains(&ViewEvent::Expand(id("çelës"))));
        assert_eq!(events.last(), Some(&ViewEvent::ScrollTo(id("çelës"))));
        assert_eq!(
            session.state(),
            Some(&ViewState::EntryFocused { id: id("çelës") })
        );
        assert_eq!(session.breadcrumb().unwrap().label, "çelës");
        assert_eq!(session.expanded(), vec![&id("çelës")]);
    }

    #[test]
    fn typing_supersedes_focus_and_resets_location() {
        let (mut session, _) = ready("facet/morphClass/folje");
        assert_eq!(shown(&session), vec!["abonoj", "dal"]);

        let events = session.set_query("AB");
        assert_eq!(shown(&session), vec!["abetare", "abonoj"]);
        assert_eq!(session.state(), Some(&ViewState::Browsing));
        assert!(session.breadcrumb().is_none());
        assert!(events.contains(&ViewEvent::Breadcrumb(None)));
        assert!(events.contains(&ViewEvent::Location(String::new())));
        assert_eq!(session.location().current(), "");
    }

    #[test]
    fn refiltering_is_idempotent() {
        let (mut session, _) = ready("");
        session.set_query("ab");
        let first: Vec<String> = shown(&session).into_iter().map(str::to_string).collect();
        let events = session.set_query("ab");
        assert_eq!(shown(&session), first);
        assert_eq!(events, vec![ViewEvent::Render { count: 2 }]);
    }

    #[test]
    fn facet_selectors_combine_with_text() {
        let (mut session, _) = ready("");
        session.select_facet(FacetKind::MorphClass, Some("emër"));
        assert_eq!(shown(&session), vec!["abetare", "çelës", "ëndërr"]);
        session.set_query("a");
        assert_eq!(shown(&session), vec!["abetare"]);
        session.select_facet(FacetKind::MorphClass, None);
        assert_eq!(shown(&session), vec!["abetare", "abonoj"]);
    }

    #[test]
    fn letter_jump_scrolls_without_filtering() {
        let (mut session, _) = ready("");
        assert_eq!(
            session.jump_to_letter('Ç'),
            vec![ViewEvent::ScrollTo(id("çelës"))]
        );
        session.set_query("ab");
        assert!(session.jump_to_letter('d').is_empty());
        assert_eq!(shown(&session).len(), 2);
        assert_eq!(session.state(), Some(&ViewState::Browsing));
    }

    #[test]
    fn single_policy_keeps_one_entry_open() {
        let (mut session, _) = ready("");
        session.expand_entry(&id("abetare"));
        let events = session.expand_entry(&id("dal"));
        assert_eq!(
            events,
            vec![
                ViewEvent::Collapse(id("abetare")),
                ViewEvent::Expand(id("dal")),
                ViewEvent::Location("entry/dal".to_string()),
            ]
        );
        assert_eq!(session.expanded(), vec![&id("dal")]);
    }

    #[test]
    fn multiple_policy_allows_several_open() {
        let config = SessionConfig {
            expansion: ExpansionPolicy::Multiple,
        };
        let (mut session, _) = ready_with("", config);
        session.expand_entry(&id("abetare"));
        session.expand_entry(&id("dal"));
        assert_eq!(session.expanded().len(), 2);
        session.toggle_entry(&id("abetare"));
        assert_eq!(session.expanded(), vec![&id("dal")]);
    }

    #[test]
    fn expanding_keeps_the_filtered_subset() {
        let (mut session, _) = ready("");
        session.set_query("ab");
        session.expand_entry(&id("abonoj"));
        assert_eq!(session.location().current(), "entry/abonoj");
        // The host echoes our own token back; it must not reset the list.
        assert!(session.on_location_change("entry/abonoj").is_empty());
        assert_eq!(shown(&session), vec!["abetare", "abonoj"]);
    }

    #[test]
    fn cannot_expand_hidden_entries() {
        let (mut session, _) = ready("");
        session.set_query("ab");
        assert!(session.expand_entry(&id("dal")).is_empty());
        assert!(session.expand_entry(&id("mungon")).is_empty());
    }

    #[test]
    fn in_page_facet_link_routes_like_a_deep_link() {
        let (mut session, _) = ready("");
        session.expand_entry(&id("ëndërr"));
        let events = session.follow_link("#kategori/neologjizem/jo");
        assert_eq!(events.last(), Some(&ViewEvent::Location("facet/neologism/jo".to_string())));
        assert!(events.contains(&ViewEvent::Collapse(id("ëndërr"))));
        assert_eq!(shown(&session), vec!["ëndërr"]);
        assert_eq!(
            session.state(),
            Some(&ViewState::FacetFocused {
                facet: FacetKind::Neologism,
                value: "jo".to_string()
            })
        );
        assert_eq!(session.breadcrumb().unwrap().label, "Neologjizëm: jo");
    }

    #[test]
    fn expanding_another_entry_moves_the_focus() {
        let (mut session, _) = ready("entry/abetare");
        let events = session.expand_entry(&id("dal"));
        let expected_crumb = Breadcrumb {
            intent: RouteIntent::ShowEntry { id: id("dal") },
            label: "dal".to_string(),
        };
        assert!(events.contains(&ViewEvent::Breadcrumb(Some(expected_crumb.clone()))));
        assert_eq!(session.state(), Some(&ViewState::EntryFocused { id: id("dal") }));
        assert_eq!(session.breadcrumb(), Some(&expected_crumb));
        assert_eq!(session.expanded(), vec![&id("dal")]);
        assert_eq!(session.location().current(), "entry/dal");
    }

    #[test]
    fn expanding_inside_a_facet_view_keeps_the_facet_focus() {
        let (mut session, _) = ready("facet/morphClass/folje");
        let events = session.expand_entry(&id("dal"));
        assert!(!events.iter().any(|event| matches!(event, ViewEvent::Breadcrumb(_))));
        assert!(matches!(session.state(), Some(ViewState::FacetFocused { .. })));
    }

    #[test]
    fn unknown_facet_link_does_not_publish_its_token() {
        let (mut session, _) = ready("");
        session.follow_link("facet/morphClass/folje");
        let events = session.follow_link("facet/morphClass/ndajfolje");
        assert_eq!(events.last(), Some(&ViewEvent::Location(String::new())));
        assert_eq!(session.state(), Some(&ViewState::Browsing));
        assert_eq!(session.location().current(), "");

        let events = session.follow_link("facet/morphClass/ndajfolje");
        assert!(!events.iter().any(|event| matches!(event, ViewEvent::Location(_))));
        assert_eq!(session.location().current(), "");
    }

    #[test]
    fn history_navigation_replays_routes() {
        let (mut session, _) = ready("");
        session.follow_link("facet/morphClass/folje");
        session.back_to_dictionary();
        assert_eq!(session.location().history(), &["", "facet/morphClass/folje", ""]);

        let token = session.location_mut().back().unwrap();
        session.on_location_change(&token);
        assert_eq!(shown(&session), vec!["abonoj", "dal"]);

        let token = session.location_mut().back().unwrap();
        session.on_location_change(&token);
        assert_eq!(session.state(), Some(&ViewState::Browsing));
        assert_eq!(shown(&session).len(), 5);
        assert!(session.breadcrumb().is_none());
    }

    #[test]
    fn stale_links_fall_back_to_browsing() {
        let (mut session, _) = ready("");
        session.set_query("ab");
        session.on_location_change("entry/doesnotexist");
        assert_eq!(session.state(), Some(&ViewState::Browsing));
        assert_eq!(shown(&session).len(), 5);
        assert!(session.expanded().is_empty());

        session.on_location_change("facet/morphClass/ndajfolje");
        assert_eq!(session.state(), Some(&ViewState::Browsing));
        assert!(session.breadcrumb().is_none());
    }

    #[test]
    fn empty_token_while_browsing_keeps_the_query() {
        let (mut session, _) = ready("");
        session.set_query("ab");
        session.on_location_change("garbage");
        assert_eq!(shown(&session), vec!["abetare", "abonoj"]);
    }

    #[test]
    fn back_to_dictionary_clears_everything() {
        let (mut session, _) = ready("entry/dal");
        let events = session.back_to_dictionary();
        assert!(events.contains(&ViewEvent::Collapse(id("dal"))));
        assert!(events.contains(&ViewEvent::Breadcrumb(None)));
        assert!(events.contains(&ViewEvent::Location(String::new())));
        assert_eq!(session.state(), Some(&ViewState::Browsing));
        assert_eq!(session.query(), Some(&Query::default()));
        assert_eq!(shown(&session).len(), 5);
    }

    #[test]
    fn display_mode_is_persisted_through_the_store() {
        let mut prefs = MemoryPreferences::default();
        prefs.set("theme", "dark").unwrap();
        let mut session =
            ViewSession::new(SessionConfig::default(), prefs, MemoryLocation::default());
        assert_eq!(session.display_mode(), DisplayMode::Dark);
        let events = session.toggle_display_mode();
        assert_eq!(events, vec![ViewEvent::DisplayMode(DisplayMode::Light)]);
        assert_eq!(session.prefs().get("theme").as_deref(), Some("light"));
    }
}
