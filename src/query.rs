use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::normalize::normalize;
use crate::{Collection, Entry, FacetKind};

/// At most one selected value per facet kind.
pub type FacetSelection = BTreeMap<FacetKind, String>;

/// Free text plus facet selection, as typed/picked by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub facets: FacetSelection,
}

impl Query {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            facets: FacetSelection::new(),
        }
    }

    pub fn facet(kind: FacetKind, value: impl Into<String>) -> Self {
        Self::default().with_facet(kind, value)
    }

    pub fn with_facet(mut self, kind: FacetKind, value: impl Into<String>) -> Self {
        self.facets.insert(kind, value.into());
        self
    }

    /// True when the query imposes no constraint at all.
    pub fn is_unconstrained(&self) -> bool {
        normalize(&self.text).is_empty() && self.facets.is_empty()
    }
}

/// Positions into a [`Collection`], in collection order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subset {
    positions: Vec<usize>,
}

impl Subset {
    pub fn all(collection: &Collection) -> Self {
        Self {
            positions: (0..collection.len()).collect(),
        }
    }

    pub(crate) fn from_sorted(positions: Vec<usize>) -> Self {
        Self { positions }
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, position: usize) -> bool {
        self.positions.binary_search(&position).is_ok()
    }

    pub fn entries<'a>(&'a self, collection: &'a Collection) -> impl Iterator<Item = &'a Entry> + 'a {
        self.positions
            .iter()
            .filter_map(move |&pos| collection.get(pos))
    }

    pub fn headwords<'a>(&'a self, collection: &'a Collection) -> Vec<&'a str> {
        self.entries(collection).map(Entry::headword).collect()
    }
}

/// Entries matching `query`, in collection order.
///
/// Prefix match on the normalized id, then every selected facet must be present.
pub fn resolve(collection: &Collection, query: &Query) -> Subset {
    let prefix = normalize(&query.text);
    let candidates = if prefix.is_empty() {
        (0..collection.len()).collect()
    } else {
        let mut positions = collection.prefix_positions(&prefix);
        positions.sort_unstable();
        positions
    };
    if query.facets.is_empty() {
        return Subset::from_sorted(candidates);
    }
    let positions = candidates
        .into_iter()
        .filter(|&pos| {
            collection
                .get(pos)
                .is_some_and(|entry| matches_facets(entry, &query.facets))
        })
        .collect();
    Subset::from_sorted(positions)
}

fn matches_facets(entry: &Entry, facets: &FacetSelection) -> bool {
    facets
        .iter()
        .all(|(kind, value)| entry.facets().contains(*kind, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dictionary() -> Collection {
        Collection::new(vec![
            Entry::new("Abetare")
                .with_facet(FacetKind::MorphClass, "emër")
                .with_facet(FacetKind::Formation, "e prejardhur"),
            Entry::new("Çelës").with_facet(FacetKind::MorphClass, "emër"),
            Entry::new("abc"),
            Entry::new("celuloid")
                .with_facet(FacetKind::MorphClass, "emër")
                .with_facet(FacetKind::Neologism, "po"),
            Entry::new("shkoj")
                .with_facet(FacetKind::MorphClass, "folje")
                .with_facet(FacetKind::Formation, "e parme"),
        ])
    }

    #[test]
    fn prefix_is_case_and_diacritic_insensitive() {
        let collection = dictionary();
        let subset = resolve(&collection, &Query::text("ab"));
        assert_eq!(subset.headwords(&collection), vec!["Abetare", "abc"]);
        let subset = resolve(&collection, &Query::text("ÇEL"));
        assert_eq!(subset.headwords(&collection), vec!["Çelës", "celuloid"]);
    }

    #[test]
    fn prefix_is_not_substring() {
        let collection = dictionary();
        assert!(resolve(&collection, &Query::text("koj")).is_empty());
    }

    #[test]
    fn facets_are_conjunctive() {
        let collection = dictionary();
        let query = Query::facet(FacetKind::MorphClass, "emër").with_facet(FacetKind::Neologism, "po");
        let subset = resolve(&collection, &query);
        assert_eq!(subset.headwords(&collection), vec!["celuloid"]);
    }

    #[test]
    fn missing_facet_kind_excludes_entry() {
        let collection = dictionary();
        let subset = resolve(&collection, &Query::facet(FacetKind::Formation, "e parme"));
        assert_eq!(subset.headwords(&collection), vec!["shkoj"]);
    }

    #[test]
    fn text_and_facets_combine() {
        let collection = dictionary();
        let query = Query::text("c").with_facet(FacetKind::MorphClass, "emër");
        let subset = resolve(&collection, &query);
        assert_eq!(subset.headwords(&collection), vec!["Çelës", "celuloid"]);
    }

    #[test]
    fn empty_query_is_identity() {
        let collection = dictionary();
        let subset = resolve(&collection, &Query::default());
        assert_eq!(subset, Subset::all(&collection));
        assert!(Query::default().is_unconstrained());
    }

    fn arb_collection() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-eçëA-E]{0,5}", 0..24)
    }

    proptest! {
        #[test]
        fn resolve_is_exact_ordered_prefix_filter(words in arb_collection(), query in "[a-eçëA-E]{0,3}") {
            let collection = Collection::new(words.iter().map(|w| Entry::new(w.as_str())).collect());
            let prefix = normalize(&query);
            let expected: Vec<usize> = collection
                .entries()
                .iter()
                .enumerate()
                .filter(|(_, entry)| prefix.is_empty() || entry.id().as_str().starts_with(&prefix))
                .map(|(pos, _)| pos)
                .collect();
            let subset = resolve(&collection, &Query::text(query.clone()));
            prop_assert_eq!(subset.positions(), expected.as_slice());
        }

        #[test]
        fn resolve_is_idempotent(words in arb_collection(), query in "[a-e]{0,2}") {
            let collection = Collection::new(words.iter().map(|w| Entry::new(w.as_str())).collect());
            let q = Query::text(query);
            prop_assert_eq!(resolve(&collection, &q), resolve(&collection, &q));
        }
    }
}
