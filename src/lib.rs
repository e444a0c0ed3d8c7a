pub mod collation;
mod data;
pub mod index;
pub mod normalize;
pub mod prefs;
pub mod query;
pub mod route;
pub mod session;
pub mod snapshot;

#[cfg(feature = "web")]
pub mod web;

pub use data::{
    DEFAULT_KEY_FIELDS, Definition, DuplicatePolicy, Entry, EntryId, FacetKind, FacetMap,
    LoadError, LoadOptions, LoadReport, MalformedEntry,
};
pub use index::{EntryIndex, FacetCatalogue, LetterPartition};
pub use normalize::normalize;
pub use query::{FacetSelection, Query, Subset, resolve};
pub use route::{Breadcrumb, Reconciliation, RouteIntent, parse, reconcile};
pub use session::{
    DisplayMode, ExpansionPolicy, LocationChannel, MemoryLocation, SessionConfig, ViewEvent,
    ViewSession, ViewState,
};

use collation::CollationKey;
use fst::Automaton;
use fst::automaton::Str;
use fst::{IntoStreamer, Map, Streamer};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// A loaded, immutable set of entries with an id map for exact and prefix lookups.
///
/// Every non-empty id appears at most once; the duplicate policy has already
/// been applied by the time a `Collection` exists.
pub struct Collection {
    entries: Vec<Entry>,
    ids: Map<Vec<u8>>,
}

impl Collection {
    /// Builds a collection in the given order, letting later duplicates win.
    pub fn new(entries: Vec<Entry>) -> Self {
        let (entries, _) = dedupe(entries, DuplicatePolicy::LastWins);
        Self::from_unique(entries)
    }

    pub fn with_policy(entries: Vec<Entry>, policy: DuplicatePolicy) -> Result<Self, LoadError> {
        let (entries, _) = apply_policy(entries, policy)?;
        Ok(Self::from_unique(entries))
    }

    /// Loads a JSON dataset and sorts it by collation.
    pub fn from_json_slice(
        bytes: &[u8],
        options: &LoadOptions,
    ) -> Result<(Self, LoadReport), LoadError> {
        let (entries, malformed) = data::parse_records(bytes, &options.key_fields)?;
        Self::assemble(entries, malformed, options.duplicates)
    }

    /// Opens a dataset file, accepting either JSON or a compiled snapshot.
    pub fn open(path: impl AsRef<Path>, options: &LoadOptions) -> Result<(Self, LoadReport), LoadError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let (collection, report) = if snapshot::is_snapshot(&bytes) {
            let entries = snapshot::decode(&bytes)?;
            Self::assemble(entries, 0, options.duplicates)?
        } else {
            Self::from_json_slice(&bytes, options)?
        };
        info!(
            path = %path.display(),
            loaded = report.loaded,
            malformed = report.malformed,
            duplicates = report.duplicates,
            "Loaded dictionary"
        );
        Ok((collection, report))
    }

    fn assemble(
        entries: Vec<Entry>,
        malformed: usize,
        policy: DuplicatePolicy,
    ) -> Result<(Self, LoadReport), LoadError> {
        let (mut entries, collisions) = apply_policy(entries, policy)?;
        entries.sort_by_cached_key(|entry| CollationKey::new(entry.headword()));
        let report = LoadReport {
            loaded: entries.len(),
            malformed,
            duplicates: collisions.len(),
        };
        Ok((Self::from_unique(entries), report))
    }

    fn from_unique(entries: Vec<Entry>) -> Self {
        let mut rows: Vec<(&str, u64)> = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| !entry.id().is_empty())
            .map(|(pos, entry)| (entry.id().as_str(), pos as u64))
            .collect();
        rows.sort_unstable();
        let ids = Map::from_iter(rows).expect("entry ids are sorted and unique");
        Self { entries, ids }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn get(&self, position: usize) -> Option<&Entry> {
        self.entries.get(position)
    }

    /// Position of the entry with exactly this id.
    pub fn position(&self, id: &EntryId) -> Option<usize> {
        self.ids.get(id.as_str()).map(|pos| pos as usize)
    }

    pub fn lookup(&self, id: &EntryId) -> Option<&Entry> {
        self.position(id).and_then(|pos| self.entries.get(pos))
    }

    /// Looks up a word as typed, normalizing it first.
    pub fn lookup_word(&self, word: &str) -> Option<&Entry> {
        self.lookup(&EntryId::new(word))
    }

    /// Positions of entries whose id starts with `prefix`, in id order.
    ///
    /// `prefix` must already be normalized.
    pub fn prefix_positions(&self, prefix: &str) -> Vec<usize> {
        let automaton = Str::new(prefix).starts_with();
        let mut stream = self.ids.search(automaton).into_stream();
        let mut positions = Vec::new();
        while let Some((_, value)) = stream.next() {
            positions.push(value as usize);
        }
        positions
    }
}

/// Runs [`dedupe`] and fails on the first collision under [`DuplicatePolicy::Reject`].
fn apply_policy(
    entries: Vec<Entry>,
    policy: DuplicatePolicy,
) -> Result<(Vec<Entry>, Vec<EntryId>), LoadError> {
    let (entries, collisions) = dedupe(entries, policy);
    if policy == DuplicatePolicy::Reject {
        if let Some(id) = collisions.first() {
            return Err(LoadError::DuplicateIdentifier { id: id.to_string() });
        }
    }
    Ok((entries, collisions))
}

/// Collapses entries sharing an id, returning the survivors and the ids that collided.
fn dedupe(entries: Vec<Entry>, policy: DuplicatePolicy) -> (Vec<Entry>, Vec<EntryId>) {
    let mut kept: Vec<Entry> = Vec::with_capacity(entries.len());
    let mut slots: HashMap<EntryId, usize> = HashMap::new();
    let mut collisions = Vec::new();
    for entry in entries {
        if entry.id().is_empty() {
            kept.push(entry);
            continue;
        }
        match slots.get(entry.id()) {
            None => {
                slots.insert(entry.id().clone(), kept.len());
                kept.push(entry);
            }
            Some(&slot) => {
                warn!(id = %entry.id(), policy = ?policy, "Duplicate entry identifier");
                collisions.push(entry.id().clone());
                if policy == DuplicatePolicy::LastWins {
                    kept[slot] = entry;
                }
            }
        }
    }
    (kept, collisions)
}
