use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::collation::{CollationKey, sort_strings};
use crate::normalize::first_letter;
use crate::query::Subset;
use crate::{Collection, Entry, EntryId, FacetKind};

/// Canonical first letter → positions, each bucket in collation order.
///
/// Derived from one subset; rebuild it instead of mutating it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LetterPartition {
    buckets: BTreeMap<char, Vec<usize>>,
}

impl LetterPartition {
    pub fn build(collection: &Collection, subset: &Subset) -> Self {
        let mut keyed: BTreeMap<char, Vec<(CollationKey, usize)>> = BTreeMap::new();
        for entry_pos in subset.positions() {
            let Some(entry) = collection.get(*entry_pos) else {
                continue;
            };
            // Ids are already normalized, so the first char is the canonical letter.
            let Some(letter) = entry.id().as_str().chars().next() else {
                continue;
            };
            keyed
                .entry(letter)
                .or_default()
                .push((CollationKey::new(entry.headword()), *entry_pos));
        }
        let buckets = keyed
            .into_iter()
            .map(|(letter, mut rows)| {
                rows.sort();
                (letter, rows.into_iter().map(|(_, pos)| pos).collect())
            })
            .collect();
        Self { buckets }
    }

    pub fn letters(&self) -> impl Iterator<Item = char> + '_ {
        self.buckets.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (char, &[usize])> + '_ {
        self.buckets
            .iter()
            .map(|(letter, positions)| (*letter, positions.as_slice()))
    }

    /// Bucket for `letter`; accepts any case or accented form (`Ç` finds `c`).
    pub fn bucket(&self, letter: char) -> &[usize] {
        first_letter(letter.encode_utf8(&mut [0u8; 4]))
            .and_then(|canonical| self.buckets.get(&canonical))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn first_in(&self, letter: char) -> Option<usize> {
        self.bucket(letter).first().copied()
    }

    /// Number of partitioned entries across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Distinct facet values of the full collection, per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FacetCatalogue {
    values: BTreeMap<FacetKind, Vec<String>>,
}

impl FacetCatalogue {
    pub fn build(collection: &Collection) -> Self {
        let mut seen: BTreeMap<FacetKind, BTreeSet<&str>> = BTreeMap::new();
        for entry in collection.entries() {
            for kind in FacetKind::ALL {
                seen.entry(kind)
                    .or_default()
                    .extend(entry.facets().values(kind));
            }
        }
        let values = seen
            .into_iter()
            .map(|(kind, set)| {
                let mut values: Vec<String> = set.into_iter().map(str::to_string).collect();
                sort_strings(&mut values);
                (kind, values)
            })
            .collect();
        Self { values }
    }

    /// Selectable options for `kind`, in collation order.
    pub fn values(&self, kind: FacetKind) -> &[String] {
        self.values.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, kind: FacetKind, value: &str) -> bool {
        self.values(kind).iter().any(|known| known == value)
    }
}

/// Indexes derived from one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryIndex {
    pub partition: LetterPartition,
    pub catalogue: FacetCatalogue,
}

impl EntryIndex {
    pub fn build(collection: &Collection) -> Self {
        Self {
            partition: LetterPartition::build(collection, &Subset::all(collection)),
            catalogue: FacetCatalogue::build(collection),
        }
    }

    pub fn lookup<'a>(&self, collection: &'a Collection, id: &EntryId) -> Option<&'a Entry> {
        collection.lookup(id)
    }
}
