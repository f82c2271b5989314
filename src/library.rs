// On-disk library layout and lookup index (the "on-disk track
// database" global). A disc is indexed iff its album folder contains a
// `.disc_id` marker file and at least one `NN *.<ext>` track file.
//
// The index itself is also persisted to a single JSON file (the
// configured db path) so a freshly started Commander doesn't have to wait
// out a full rescan before it can answer disc lookups.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

const MARKER_FILE: &str = ".disc_id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDisc {
    pub folder: PathBuf,
    pub disc_id: String,
    pub track_list: Vec<PathBuf>,
}

/// In-memory lookup from disc id to its indexed folder and track list.
/// Rebuilt periodically from the library root by `rebuild_scan`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LibraryIndex {
    by_disc_id: HashMap<String, IndexedDisc>,
}

impl LibraryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, disc_id: &str) -> Option<&IndexedDisc> {
        self.by_disc_id.get(disc_id)
    }

    pub fn insert(&mut self, disc: IndexedDisc) {
        self.by_disc_id.insert(disc.disc_id.clone(), disc);
    }

    pub fn len(&self) -> usize {
        self.by_disc_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_disc_id.is_empty()
    }
}

fn is_track_file(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() > 3 && bytes[0].is_ascii_digit() && bytes[1].is_ascii_digit() && bytes[2] == b' '
}

/// Walks `library_root` looking for `.disc_id` marker files and the track
/// files alongside them, and returns a freshly built index. Intended to be
/// run periodically on a background schedule external to the Player,
/// Ripper and Commander themselves.
pub fn rebuild_scan(library_root: &Path) -> LibraryIndex {
    let mut index = LibraryIndex::new();

    for entry in WalkDir::new(library_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name() == MARKER_FILE)
    {
        let marker_path = entry.path();
        let Some(folder) = marker_path.parent() else {
            continue;
        };
        let Ok(disc_id) = std::fs::read_to_string(marker_path) else {
            continue;
        };
        let disc_id = disc_id.trim().to_string();
        if disc_id.is_empty() {
            continue;
        }

        let mut track_list: Vec<PathBuf> = std::fs::read_dir(folder)
            .into_iter()
            .flatten()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(is_track_file)
                    .unwrap_or(false)
            })
            .collect();
        track_list.sort();

        if track_list.is_empty() {
            continue;
        }

        index.insert(IndexedDisc {
            folder: folder.to_path_buf(),
            disc_id,
            track_list,
        });
    }

    index
}

/// Loads a previously persisted index from `db_path`, if one exists.
pub fn load_from_file(db_path: &Path) -> Option<LibraryIndex> {
    let content = std::fs::read(db_path).ok()?;
    serde_json::from_slice(&content).ok()
}

/// Persists `index` to `db_path` as JSON, replacing whatever was there.
pub fn persist_to_file(index: &LibraryIndex, db_path: &Path) -> io::Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec(index)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    std::fs::write(db_path, json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuild_scan_finds_marked_albums() {
        let dir = tempfile::tempdir().unwrap();
        let album = dir.path().join("Positrons - The Long One Gone");
        std::fs::create_dir_all(&album).unwrap();
        std::fs::write(album.join(".disc_id"), "disc-abc").unwrap();
        std::fs::write(album.join("01 Good Days Outside.flac"), b"").unwrap();
        std::fs::write(album.join("02 Another One.flac"), b"").unwrap();
        std::fs::write(album.join("cover.jpg"), b"").unwrap();

        let index = rebuild_scan(dir.path());
        assert_eq!(index.len(), 1);
        let disc = index.lookup("disc-abc").unwrap();
        assert_eq!(disc.track_list.len(), 2);
    }

    #[test]
    fn folder_without_marker_is_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let album = dir.path().join("Unmarked");
        std::fs::create_dir_all(&album).unwrap();
        std::fs::write(album.join("01 Track.flac"), b"").unwrap();

        let index = rebuild_scan(dir.path());
        assert!(index.is_empty());
    }

    #[test]
    fn marker_without_track_files_is_not_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let album = dir.path().join("Empty");
        std::fs::create_dir_all(&album).unwrap();
        std::fs::write(album.join(".disc_id"), "disc-xyz").unwrap();

        let index = rebuild_scan(dir.path());
        assert!(index.is_empty());
    }

    #[test]
    fn persisted_index_round_trips_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let album = dir.path().join("Artist - Album");
        std::fs::create_dir_all(&album).unwrap();
        std::fs::write(album.join(".disc_id"), "disc-persisted").unwrap();
        std::fs::write(album.join("01 Track.flac"), b"").unwrap();

        let index = rebuild_scan(dir.path());
        let db_path = dir.path().join("nested").join("library.db");
        persist_to_file(&index, &db_path).unwrap();

        let loaded = load_from_file(&db_path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.lookup("disc-persisted").is_some());
    }

    #[test]
    fn missing_db_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from_file(&dir.path().join("nope.db")).is_none());
    }
}
