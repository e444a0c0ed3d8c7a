use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

use crate::normalize::normalize;
use crate::snapshot::SnapshotError;

/// Identifying fields tried in order when a record is loaded.
pub const DEFAULT_KEY_FIELDS: [&str; 5] = ["word", "headword", "tema", "baza", "nyje"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FacetKind {
    #[serde(alias = "klasa_morf")]
    MorphClass,
    #[serde(alias = "fjaleformimi")]
    Formation,
    #[serde(alias = "neologjizem")]
    Neologism,
}

impl FacetKind {
    pub const ALL: [FacetKind; 3] = [
        FacetKind::MorphClass,
        FacetKind::Formation,
        FacetKind::Neologism,
    ];

    /// Key used in route tokens and API payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            FacetKind::MorphClass => "morphClass",
            FacetKind::Formation => "formation",
            FacetKind::Neologism => "neologism",
        }
    }

    /// Key used by the original dataset files and legacy links.
    pub fn legacy_key(self) -> &'static str {
        match self {
            FacetKind::MorphClass => "klasa_morf",
            FacetKind::Formation => "fjaleformimi",
            FacetKind::Neologism => "neologjizem",
        }
    }

    /// Human-facing label shown next to facet values.
    pub fn label(self) -> &'static str {
        match self {
            FacetKind::MorphClass => "Klasa morf.",
            FacetKind::Formation => "Fjalëformimi",
            FacetKind::Neologism => "Neologjizëm",
        }
    }

    /// Accepts both the canonical and the legacy key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == key || kind.legacy_key() == key)
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized, trimmed headword; doubles as the deep-link anchor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(text: &str) -> Self {
        let id = normalize(text);
        let trimmed = id.trim();
        if trimmed.len() == id.len() {
            Self(id)
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub meaning: String,
    pub example: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacetMap(BTreeMap<FacetKind, BTreeSet<String>>);

impl FacetMap {
    pub fn insert(&mut self, kind: FacetKind, value: impl Into<String>) {
        self.0.entry(kind).or_default().insert(value.into());
    }

    /// Values for `kind`; a kind the entry does not carry yields nothing.
    pub fn values(&self, kind: FacetKind) -> impl Iterator<Item = &str> + '_ {
        self.0
            .get(&kind)
            .into_iter()
            .flat_map(|values| values.iter().map(String::as_str))
    }

    pub fn contains(&self, kind: FacetKind, value: &str) -> bool {
        self.0
            .get(&kind)
            .is_some_and(|values| values.contains(value))
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeSet::is_empty)
    }
}

/// One dictionary entry. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    headword: String,
    id: EntryId,
    definitions: Vec<Definition>,
    facets: FacetMap,
}

impl Entry {
    pub fn new(headword: impl Into<String>) -> Self {
        let headword = headword.into();
        let id = EntryId::new(&headword);
        Self {
            headword,
            id,
            definitions: Vec::new(),
            facets: FacetMap::default(),
        }
    }

    pub fn with_definition(mut self, meaning: impl Into<String>, example: Option<&str>) -> Self {
        self.definitions.push(Definition {
            meaning: meaning.into(),
            example: example.map(str::to_string),
        });
        self
    }

    pub fn with_facet(mut self, kind: FacetKind, value: impl Into<String>) -> Self {
        self.facets.insert(kind, value);
        self
    }

    pub fn headword(&self) -> &str {
        &self.headword
    }

    pub fn id(&self) -> &EntryId {
        &self.id
    }

    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    pub fn facets(&self) -> &FacetMap {
        &self.facets
    }
}

/// What to do when two records normalize to the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// The later record replaces the earlier one.
    #[default]
    LastWins,
    /// The later record is dropped.
    FirstWins,
    /// Loading fails.
    Reject,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Identifying fields, tried in order.
    pub key_fields: Vec<String>,
    pub duplicates: DuplicatePolicy,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            key_fields: DEFAULT_KEY_FIELDS.iter().map(|s| s.to_string()).collect(),
            duplicates: DuplicatePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub loaded: usize,
    pub malformed: usize,
    pub duplicates: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("dataset must be an array of entries or an object with an `entries` array")]
    NotACollection,
    #[error("duplicate entry identifier {id:?}")]
    DuplicateIdentifier { id: String },
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

/// Why a single record was left out of the collection.
#[derive(Debug, thiserror::Error)]
pub enum MalformedEntry {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("record has none of the identifying fields")]
    MissingKey,
    #[error("facet {key:?} is neither a string nor a list of strings")]
    Facet { key: String },
    #[error("record fields do not parse: {0}")]
    Fields(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct RawDefinition {
    #[serde(alias = "definition")]
    meaning: Option<String>,
    example: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    definition: Option<String>,
    example: Option<String>,
    definitions: Option<Vec<RawDefinition>>,
    #[serde(alias = "facets")]
    tags: Option<Map<String, Value>>,
}

/// Parses a JSON dataset into entries, skipping records that cannot be used.
///
/// Returns the usable entries in file order plus the number of skipped records.
pub(crate) fn parse_records(
    bytes: &[u8],
    key_fields: &[String],
) -> Result<(Vec<Entry>, usize), LoadError> {
    let records = match serde_json::from_slice::<Value>(bytes)? {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("entries") {
            Some(Value::Array(items)) => items,
            _ => return Err(LoadError::NotACollection),
        },
        _ => return Err(LoadError::NotACollection),
    };

    let mut entries = Vec::with_capacity(records.len());
    let mut malformed = 0usize;
    for (idx, record) in records.into_iter().enumerate() {
        match record_to_entry(record, key_fields) {
            Ok(entry) => entries.push(entry),
            Err(reason) => {
                malformed += 1;
                debug!(record = idx, %reason, "skipping malformed entry");
            }
        }
    }
    Ok((entries, malformed))
}

fn record_to_entry(record: Value, key_fields: &[String]) -> Result<Entry, MalformedEntry> {
    let object = record.as_object().ok_or(MalformedEntry::NotAnObject)?;
    let headword = display_key(object, key_fields)
        .ok_or(MalformedEntry::MissingKey)?
        .to_string();
    let raw: RawRecord = serde_json::from_value(record)?;

    let mut entry = Entry::new(headword);
    if let Some(meaning) = non_empty(raw.definition) {
        entry.definitions.push(Definition {
            meaning,
            example: non_empty(raw.example),
        });
    }
    for definition in raw.definitions.unwrap_or_default() {
        if let Some(meaning) = non_empty(definition.meaning) {
            entry.definitions.push(Definition {
                meaning,
                example: non_empty(definition.example),
            });
        }
    }
    for (key, value) in raw.tags.unwrap_or_default() {
        let Some(kind) = FacetKind::from_key(&key) else {
            debug!(facet = %key, "ignoring unknown facet kind");
            continue;
        };
        for value in facet_values(&key, value)? {
            entry.facets.insert(kind, value);
        }
    }
    Ok(entry)
}

fn display_key<'a>(object: &'a Map<String, Value>, key_fields: &[String]) -> Option<&'a str> {
    key_fields.iter().find_map(|field| {
        object
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
    })
}

fn facet_values(key: &str, value: Value) -> Result<Vec<String>, MalformedEntry> {
    let malformed = || MalformedEntry::Facet {
        key: key.to_string(),
    };
    let values = match value {
        Value::Null => Vec::new(),
        Value::String(text) => vec![text],
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(text) => Ok(text),
                _ => Err(malformed()),
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err(malformed()),
    };
    Ok(values
        .into_iter()
        .filter_map(|text| non_empty(Some(text)))
        .collect())
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}
