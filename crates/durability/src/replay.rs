//! Snapshot file validation and recovery replay.
//!
//! Validation is purely structural: a snapshot file is complete iff it
//! ends with exactly one well-formed terminal record. Replay reads the
//! record stream front to back and feeds every record into the engine's
//! redo path, tracking the most recently linked collection item so that
//! element records attach to the right owner.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use embercache_core::{Item, RedoError, SnapshotEngine};
use thiserror::Error;
use tracing::{info, warn};

use crate::record::{
    self, RecordError, RecordHeader, RecordKind, DONE_MAGIC, MAX_RECORD_BODY, RECORD_HEADER_SIZE,
    TERMINAL_RECORD_SIZE,
};

/// Fatal conditions that abort a replay.
///
/// Per-record redo failures other than memory exhaustion are tolerated:
/// the affected item is skipped (with its elements) and replay continues.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// I/O failure reading the snapshot file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream ended inside a record header.
    #[error("snapshot file corrupt: truncated record header")]
    TruncatedHeader,

    /// The stream ended inside a record body.
    #[error("snapshot file corrupt: truncated record body")]
    TruncatedBody,

    /// A header declares a body larger than any writer produces.
    #[error("snapshot file corrupt: record body of {0} bytes exceeds the maximum")]
    OversizedBody(u32),

    /// The terminal record's body is malformed.
    #[error("snapshot file corrupt: malformed terminal record")]
    BadTerminal,

    /// A record body failed to decode.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// The engine ran out of memory reconstructing an item or element.
    #[error("replay aborted: engine out of memory")]
    OutOfMemory,
}

/// Counters from one replay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Item-link records fed to the redo path.
    pub items: u64,
    /// Collection-element records fed to the redo path.
    pub elements: u64,
    /// Records skipped because their item could not be reconstructed.
    pub skipped: u64,
}

/// Check whether `path` holds a complete snapshot.
///
/// Returns the completeness flag and the file size. Any I/O failure,
/// including a missing file, reads as incomplete.
pub fn check_file_validity(path: &Path) -> (bool, u64) {
    match read_terminal(path) {
        Ok(result) => result,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "snapshot validity check failed");
            (false, 0)
        }
    }
}

fn read_terminal(path: &Path) -> io::Result<(bool, u64)> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < TERMINAL_RECORD_SIZE as u64 {
        return Ok((false, len));
    }
    file.seek(SeekFrom::End(-(TERMINAL_RECORD_SIZE as i64)))?;
    let mut tail = [0u8; TERMINAL_RECORD_SIZE];
    file.read_exact(&mut tail)?;
    Ok((record::is_terminal_record(&tail), len))
}

/// Replay a snapshot file into the engine's redo path.
///
/// Ends successfully either at the terminal record or as soon as the
/// engine leaves its initialized state mid-stream. Structural damage
/// (short reads, oversized or undecodable records) is fatal, as is
/// memory exhaustion in the redo path.
pub fn replay(engine: &dyn SnapshotEngine, path: &Path) -> Result<ReplayStats, ReplayError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut stats = ReplayStats::default();
    let mut header_buf = [0u8; RECORD_HEADER_SIZE];
    let mut body = Vec::new();

    // The most recently linked collection item. Element records attach
    // here; it is cleared whenever a link fails or yields a plain item.
    let mut pending: Option<Arc<Item>> = None;

    info!(path = %path.display(), "snapshot replay starting");

    while engine.is_initialized() {
        reader
            .read_exact(&mut header_buf)
            .map_err(|e| short_read(e, ReplayError::TruncatedHeader))?;
        let header = RecordHeader::from_bytes(&header_buf)?;
        if header.body_len as usize > MAX_RECORD_BODY {
            return Err(ReplayError::OversizedBody(header.body_len));
        }

        body.resize(header.body_len as usize, 0);
        reader
            .read_exact(&mut body)
            .map_err(|e| short_read(e, ReplayError::TruncatedBody))?;

        match header.kind {
            RecordKind::ItemLink => {
                let item = record::decode_item_link(&body)?;
                let key = item.key.clone();
                match engine.redo_item_link(item) {
                    Ok(owner) => {
                        pending = owner;
                        stats.items += 1;
                    }
                    Err(RedoError::OutOfMemory) => return Err(ReplayError::OutOfMemory),
                    Err(e) => {
                        warn!(
                            key = %String::from_utf8_lossy(&key),
                            error = %e,
                            "skipping item that failed to replay"
                        );
                        pending = None;
                        stats.skipped += 1;
                    }
                }
            }
            RecordKind::CollectionElement => {
                let element = record::decode_element(&body);
                match &pending {
                    None => {
                        warn!("skipping collection element with no owning item");
                        stats.skipped += 1;
                    }
                    Some(owner) => match engine.redo_collection_element(owner, element) {
                        Ok(()) => stats.elements += 1,
                        Err(RedoError::OutOfMemory) => return Err(ReplayError::OutOfMemory),
                        Err(e) => {
                            warn!(
                                key = %String::from_utf8_lossy(&owner.key),
                                error = %e,
                                "skipping element that failed to replay"
                            );
                            stats.skipped += 1;
                        }
                    },
                }
            }
            RecordKind::SnapshotDone => {
                if body.as_slice() != DONE_MAGIC {
                    return Err(ReplayError::BadTerminal);
                }
                info!(
                    items = stats.items,
                    elements = stats.elements,
                    skipped = stats.skipped,
                    "snapshot replay finished"
                );
                return Ok(stats);
            }
        }
    }

    warn!("snapshot replay cut short: engine no longer initialized");
    Ok(stats)
}

fn short_read(e: io::Error, truncated: ReplayError) -> ReplayError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        truncated
    } else {
        ReplayError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embercache_core::{Element, ElemsResult, Expiry, ItemScanner, ItemType, ScanOutcome};
    use parking_lot::Mutex;
    use std::io::Write;
    use tempfile::tempdir;

    struct RecordingEngine {
        initialized: bool,
        linked: Mutex<Vec<Item>>,
        elements: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
    }

    impl RecordingEngine {
        fn new() -> Self {
            RecordingEngine {
                initialized: true,
                linked: Mutex::new(Vec::new()),
                elements: Mutex::new(Vec::new()),
            }
        }
    }

    impl SnapshotEngine for RecordingEngine {
        fn is_initialized(&self) -> bool {
            self.initialized
        }

        fn current_time(&self) -> u32 {
            0
        }

        fn open_scan(&self, _prefix: Option<&[u8]>) -> Box<dyn ItemScanner> {
            struct Never;
            impl ItemScanner for Never {
                fn next_batch(
                    &mut self,
                    _limit: usize,
                    _items: &mut Vec<Arc<Item>>,
                    _elems: Option<&mut [ElemsResult]>,
                ) -> ScanOutcome {
                    ScanOutcome::Exhausted
                }
            }
            Box::new(Never)
        }

        fn redo_item_link(&self, item: Item) -> Result<Option<Arc<Item>>, RedoError> {
            if item.key.starts_with(b"oom") {
                return Err(RedoError::OutOfMemory);
            }
            if item.key.starts_with(b"bad") {
                return Err(RedoError::Failed("no space in hash table".to_string()));
            }
            self.linked.lock().push(item.clone());
            Ok(item.is_collection().then(|| Arc::new(item)))
        }

        fn redo_collection_element(
            &self,
            owner: &Arc<Item>,
            element: Element,
        ) -> Result<(), RedoError> {
            self.elements
                .lock()
                .push((owner.key.clone(), element.payload));
            Ok(())
        }
    }

    fn item(key: &str, ty: ItemType) -> Item {
        Item {
            key: key.as_bytes().to_vec(),
            item_type: ty,
            flags: 0,
            expiry: Expiry::Never,
            value: b"v".to_vec(),
        }
    }

    fn push_item(out: &mut Vec<u8>, item: &Item) {
        let mut body = Vec::new();
        record::encode_item_link(item, &mut body).unwrap();
        let header = RecordHeader {
            kind: RecordKind::ItemLink,
            body_len: body.len() as u32,
        };
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&body);
    }

    fn push_element(out: &mut Vec<u8>, payload: &[u8]) {
        let header = RecordHeader {
            kind: RecordKind::CollectionElement,
            body_len: payload.len() as u32,
        };
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(payload);
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        File::create(&path).unwrap().write_all(bytes).unwrap();
        path
    }

    #[test]
    fn test_replay_links_items_and_attaches_elements() {
        let dir = tempdir().unwrap();
        let mut bytes = Vec::new();
        push_item(&mut bytes, &item("plain", ItemType::Kv));
        push_item(&mut bytes, &item("list", ItemType::List));
        push_element(&mut bytes, b"e1");
        push_element(&mut bytes, b"e2");
        bytes.extend_from_slice(&record::terminal_record());
        let path = write_file(&dir, "ok.snap", &bytes);

        let engine = RecordingEngine::new();
        let stats = replay(&engine, &path).unwrap();
        assert_eq!(stats.items, 2);
        assert_eq!(stats.elements, 2);
        assert_eq!(stats.skipped, 0);

        let elements = engine.elements.lock();
        assert_eq!(elements[0], (b"list".to_vec(), b"e1".to_vec()));
        assert_eq!(elements[1], (b"list".to_vec(), b"e2".to_vec()));
    }

    #[test]
    fn test_replay_orphan_element_skipped() {
        let dir = tempdir().unwrap();
        let mut bytes = Vec::new();
        // A plain item clears the pending owner; its trailing element has
        // nothing to attach to.
        push_item(&mut bytes, &item("plain", ItemType::Kv));
        push_element(&mut bytes, b"stray");
        bytes.extend_from_slice(&record::terminal_record());
        let path = write_file(&dir, "orphan.snap", &bytes);

        let engine = RecordingEngine::new();
        let stats = replay(&engine, &path).unwrap();
        assert_eq!(stats.items, 1);
        assert_eq!(stats.elements, 0);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_replay_tolerated_link_failure_drops_its_elements() {
        let dir = tempdir().unwrap();
        let mut bytes = Vec::new();
        push_item(&mut bytes, &item("bad-list", ItemType::List));
        push_element(&mut bytes, b"lost");
        push_item(&mut bytes, &item("good", ItemType::Set));
        push_element(&mut bytes, b"kept");
        bytes.extend_from_slice(&record::terminal_record());
        let path = write_file(&dir, "partial.snap", &bytes);

        let engine = RecordingEngine::new();
        let stats = replay(&engine, &path).unwrap();
        assert_eq!(stats.items, 1);
        assert_eq!(stats.elements, 1);
        assert_eq!(stats.skipped, 2);
        assert_eq!(engine.elements.lock()[0].0, b"good".to_vec());
    }

    #[test]
    fn test_replay_oom_is_fatal() {
        let dir = tempdir().unwrap();
        let mut bytes = Vec::new();
        push_item(&mut bytes, &item("oom-key", ItemType::Kv));
        bytes.extend_from_slice(&record::terminal_record());
        let path = write_file(&dir, "oom.snap", &bytes);

        let engine = RecordingEngine::new();
        let err = replay(&engine, &path).unwrap_err();
        assert!(matches!(err, ReplayError::OutOfMemory));
    }

    #[test]
    fn test_replay_truncated_header_is_corrupt() {
        let dir = tempdir().unwrap();
        let mut bytes = Vec::new();
        push_item(&mut bytes, &item("a", ItemType::Kv));
        bytes.extend_from_slice(&[1u8, 0, 0]); // header cut short, no terminal
        let path = write_file(&dir, "cut.snap", &bytes);

        let engine = RecordingEngine::new();
        let err = replay(&engine, &path).unwrap_err();
        assert!(matches!(err, ReplayError::TruncatedHeader));
    }

    #[test]
    fn test_replay_truncated_body_is_corrupt() {
        let dir = tempdir().unwrap();
        let mut bytes = Vec::new();
        push_item(&mut bytes, &item("a", ItemType::Kv));
        bytes.truncate(bytes.len() - 2);
        let path = write_file(&dir, "cut-body.snap", &bytes);

        let engine = RecordingEngine::new();
        let err = replay(&engine, &path).unwrap_err();
        assert!(matches!(err, ReplayError::TruncatedBody));
    }

    #[test]
    fn test_replay_oversized_body_is_corrupt() {
        let dir = tempdir().unwrap();
        let header = RecordHeader {
            kind: RecordKind::ItemLink,
            body_len: (MAX_RECORD_BODY as u32) + 1,
        };
        let path = write_file(&dir, "huge.snap", &header.to_bytes());

        let engine = RecordingEngine::new();
        let err = replay(&engine, &path).unwrap_err();
        assert!(matches!(err, ReplayError::OversizedBody(_)));
    }

    #[test]
    fn test_replay_stops_when_engine_uninitialized() {
        let dir = tempdir().unwrap();
        let mut bytes = Vec::new();
        push_item(&mut bytes, &item("a", ItemType::Kv));
        bytes.extend_from_slice(&record::terminal_record());
        let path = write_file(&dir, "early-exit.snap", &bytes);

        let mut engine = RecordingEngine::new();
        engine.initialized = false;
        let stats = replay(&engine, &path).unwrap();
        assert_eq!(stats, ReplayStats::default());
    }

    #[test]
    fn test_validity_accepts_complete_file() {
        let dir = tempdir().unwrap();
        let mut bytes = Vec::new();
        push_item(&mut bytes, &item("a", ItemType::Kv));
        bytes.extend_from_slice(&record::terminal_record());
        let path = write_file(&dir, "ok.snap", &bytes);

        let (complete, size) = check_file_validity(&path);
        assert!(complete);
        assert_eq!(size, bytes.len() as u64);
    }

    #[test]
    fn test_validity_rejects_partial_and_missing_files() {
        let dir = tempdir().unwrap();
        let mut bytes = Vec::new();
        push_item(&mut bytes, &item("a", ItemType::Kv));
        let path = write_file(&dir, "partial.snap", &bytes);

        let (complete, _) = check_file_validity(&path);
        assert!(!complete);

        let (complete, size) = check_file_validity(&dir.path().join("tiny.snap"));
        assert!(!complete);
        assert_eq!(size, 0);

        let path = write_file(&dir, "short.snap", b"abc");
        let (complete, size) = check_file_validity(&path);
        assert!(!complete);
        assert_eq!(size, 3);
    }
}
