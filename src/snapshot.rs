//! Compiled dataset: a zstd-compressed rkyv archive of the sorted collection.
//!
//! `Collection::open` recognises a snapshot by the zstd frame magic and
//! falls back to JSON otherwise.

use rkyv::rancor::Error as RkyvError;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use zstd::bulk::compress as zstd_compress;
use zstd::stream::decode_all;

use crate::{Collection, Entry, FacetKind};

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
const SNAPSHOT_VERSION: u32 = 1;
const COMPRESSION_LEVEL: i32 = 19;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to access snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot is not a valid zstd stream: {0}")]
    Compression(std::io::Error),
    #[error("snapshot archive is corrupt: {0}")]
    Archive(RkyvError),
    #[error("unsupported snapshot version {found} (expected {})", SNAPSHOT_VERSION)]
    Version { found: u32 },
}

#[derive(Archive, Serialize, Deserialize, Debug)]
struct SnapshotStore {
    version: u32,
    entries: Vec<SnapshotEntry>,
}

#[derive(Archive, Serialize, Deserialize, Debug)]
struct SnapshotEntry {
    headword: String,
    definitions: Vec<SnapshotDefinition>,
    morph_class: Vec<String>,
    formation: Vec<String>,
    neologism: Vec<String>,
}

#[derive(Archive, Serialize, Deserialize, Debug)]
struct SnapshotDefinition {
    meaning: String,
    example: Option<String>,
}

impl SnapshotEntry {
    fn from_entry(entry: &Entry) -> Self {
        let values = |kind| -> Vec<String> { entry.facets().values(kind).map(str::to_string).collect() };
        Self {
            headword: entry.headword().to_string(),
            definitions: entry
                .definitions()
                .iter()
                .map(|definition| SnapshotDefinition {
                    meaning: definition.meaning.clone(),
                    example: definition.example.clone(),
                })
                .collect(),
            morph_class: values(FacetKind::MorphClass),
            formation: values(FacetKind::Formation),
            neologism: values(FacetKind::Neologism),
        }
    }

    fn into_entry(self) -> Entry {
        let mut entry = Entry::new(self.headword);
        for definition in self.definitions {
            entry = entry.with_definition(definition.meaning, definition.example.as_deref());
        }
        let facets = [
            (FacetKind::MorphClass, self.morph_class),
            (FacetKind::Formation, self.formation),
            (FacetKind::Neologism, self.neologism),
        ];
        for (kind, values) in facets {
            for value in values {
                entry = entry.with_facet(kind, value);
            }
        }
        entry
    }
}

pub fn is_snapshot(bytes: &[u8]) -> bool {
    bytes.starts_with(&ZSTD_MAGIC)
}

pub fn encode(collection: &Collection) -> Result<Vec<u8>, SnapshotError> {
    let store = SnapshotStore {
        version: SNAPSHOT_VERSION,
        entries: collection.entries().iter().map(SnapshotEntry::from_entry).collect(),
    };
    let bytes = rkyv::to_bytes::<RkyvError>(&store).map_err(SnapshotError::Archive)?;
    zstd_compress(&bytes, COMPRESSION_LEVEL).map_err(SnapshotError::Compression)
}

/// Entries in stored order.
pub fn decode(bytes: &[u8]) -> Result<Vec<Entry>, SnapshotError> {
    let decompressed = decode_all(Cursor::new(bytes)).map_err(SnapshotError::Compression)?;
    let mut aligned: AlignedVec = AlignedVec::with_capacity(decompressed.len());
    aligned.extend_from_slice(&decompressed);
    let store = rkyv::from_bytes::<SnapshotStore, RkyvError>(aligned.as_slice())
        .map_err(SnapshotError::Archive)?;
    if store.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::Version {
            found: store.version,
        });
    }
    Ok(store.entries.into_iter().map(SnapshotEntry::into_entry).collect())
}

pub fn write(path: impl AsRef<Path>, collection: &Collection) -> Result<usize, SnapshotError> {
    let path = path.as_ref();
    let bytes = encode(collection)?;
    fs::write(path, &bytes).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(bytes.len())
}

pub fn read(path: impl AsRef<Path>) -> Result<Vec<Entry>, SnapshotError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode(&bytes)
}
