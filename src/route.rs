//! Location tokens (`entry/<id>`, `facet/<kind>/<value>`) and how they map
//! onto a subset, an entry to open and a breadcrumb.
//!
//! Unknown or stale tokens never fail; they degrade to [`RouteIntent::None`]
//! or to the unfocused collection.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde::Serialize;
use std::fmt;

use crate::index::EntryIndex;
use crate::query::{Query, Subset, resolve};
use crate::{Collection, EntryId, FacetKind};

const ENTRY_PREFIXES: [&str; 2] = ["entry/", "fjala/"];
const FACET_PREFIXES: [&str; 2] = ["facet/", "kategori/"];

const TOKEN_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RouteIntent {
    None,
    ShowEntry { id: EntryId },
    ShowFacet { facet: FacetKind, value: String },
}

impl RouteIntent {
    /// Canonical token for this intent; `None` publishes the empty token.
    pub fn token(&self) -> String {
        match self {
            RouteIntent::None => String::new(),
            RouteIntent::ShowEntry { id } => format!("entry/{}", encode_segment(id.as_str())),
            RouteIntent::ShowFacet { facet, value } => {
                format!("facet/{}/{}", facet.as_str(), encode_segment(value))
            }
        }
    }
}

impl fmt::Display for RouteIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteIntent::None => write!(f, "none"),
            RouteIntent::ShowEntry { id } => write!(f, "entry {id}"),
            RouteIntent::ShowFacet { facet, value } => write!(f, "facet {facet}={value}"),
        }
    }
}

/// Focus record shown above the list, with the label to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub intent: RouteIntent,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub subset: Subset,
    /// Position of the entry to open, if the link named one that exists.
    pub expand: Option<usize>,
    pub breadcrumb: Option<Breadcrumb>,
}

pub fn parse(token: &str) -> RouteIntent {
    let token = token.trim();
    let token = token.strip_prefix('#').unwrap_or(token);

    if let Some(rest) = strip_any(token, &ENTRY_PREFIXES) {
        return match decode_segment(rest) {
            Some(raw) => {
                let id = EntryId::new(&raw);
                if id.is_empty() {
                    RouteIntent::None
                } else {
                    RouteIntent::ShowEntry { id }
                }
            }
            None => RouteIntent::None,
        };
    }

    if let Some(rest) = strip_any(token, &FACET_PREFIXES) {
        let Some((kind, value)) = rest.split_once('/') else {
            return RouteIntent::None;
        };
        let Some(facet) = FacetKind::from_key(kind) else {
            return RouteIntent::None;
        };
        return match decode_segment(value) {
            Some(value) if !value.is_empty() => RouteIntent::ShowFacet { facet, value },
            _ => RouteIntent::None,
        };
    }

    RouteIntent::None
}

pub fn reconcile(intent: &RouteIntent, collection: &Collection, index: &EntryIndex) -> Reconciliation {
    match intent {
        RouteIntent::None => unfocused(collection),
        RouteIntent::ShowEntry { id } => {
            let expand = collection.position(id);
            let breadcrumb = expand.and_then(|pos| collection.get(pos)).map(|entry| Breadcrumb {
                intent: intent.clone(),
                label: entry.headword().to_string(),
            });
            Reconciliation {
                subset: Subset::all(collection),
                expand,
                breadcrumb,
            }
        }
        RouteIntent::ShowFacet { facet, value } => {
            if !index.catalogue.contains(*facet, value) {
                return unfocused(collection);
            }
            Reconciliation {
                subset: resolve(collection, &Query::facet(*facet, value.clone())),
                expand: None,
                breadcrumb: Some(Breadcrumb {
                    intent: intent.clone(),
                    label: format!("{}: {}", facet.label(), value),
                }),
            }
        }
    }
}

fn unfocused(collection: &Collection) -> Reconciliation {
    Reconciliation {
        subset: Subset::all(collection),
        expand: None,
        breadcrumb: None,
    }
}

fn strip_any<'a>(token: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    prefixes.iter().find_map(|prefix| token.strip_prefix(prefix))
}

fn decode_segment(segment: &str) -> Option<String> {
    percent_decode_str(segment)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.trim().to_string())
}

fn encode_segment(value: &str) -> String {
    utf8_percent_encode(value, TOKEN_SEGMENT).to_string()
}
