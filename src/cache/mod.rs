use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Mutex,
        MutexGuard,
    },
};

use chrono::Utc;
use tempfile::NamedTempFile;
use tracing::{
    debug,
    warn,
};

use crate::core::DecksmithError;

pub const LEDGER_FILE: &str = "build_cache.json";

/// Persist after this many unsaved mutations; `flush()` covers the rest.
const WRITE_BATCH_SIZE: usize = 10;

/// Record of media files that already exist, so reruns skip the remote calls.
/// An entry only counts while the file is on disk and big enough to be a real
/// payload; stale entries are evicted lazily during lookup.
#[derive(Debug)]
pub struct CacheLedger {
    state: Mutex<LedgerState>,
    ledger_path: PathBuf,
    media_dir: PathBuf,
    min_bytes: u64,
}

#[derive(Debug)]
struct LedgerState {
    entries: HashMap<String, String>,
    pending: usize,
}

impl CacheLedger {
    /// Load the persisted ledger, starting empty when the file is missing or
    /// unreadable. A corrupt ledger only costs regeneration, never the build.
    pub fn load(cache_dir: &Path, media_dir: &Path, min_bytes: u64) -> Self {
        let ledger_path = cache_dir.join(LEDGER_FILE);

        let entries = match fs::read_to_string(&ledger_path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Unreadable cache ledger {}: {}. Starting empty.", ledger_path.display(), e);
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        debug!("Cache ledger loaded with {} entries", entries.len());

        Self {
            state: Mutex::new(LedgerState { entries, pending: 0 }),
            ledger_path,
            media_dir: media_dir.to_path_buf(),
            min_bytes,
        }
    }

    /// True only while the entry exists, the file exists, and the file is
    /// larger than the minimum size. A failed check deletes the stale entry,
    /// so this lookup heals the ledger as a side effect.
    pub fn is_cached(&self, filename: &str) -> bool {
        let mut state = self.lock();

        if !state.entries.contains_key(filename) {
            return false;
        }

        if let Ok(meta) = fs::metadata(self.media_dir.join(filename)) {
            if meta.len() > self.min_bytes {
                return true;
            }
        }

        state.entries.remove(filename);
        state.pending += 1;
        if state.pending >= WRITE_BATCH_SIZE {
            self.persist(&mut state);
        }
        false
    }

    /// Record files as generated. Writes are batched; the pipeline flushes at
    /// shutdown so at most one batch is ever at risk.
    pub fn mark_cached(&self, filenames: &[String]) {
        if filenames.is_empty() {
            return;
        }

        let mut state = self.lock();
        let stamp = Utc::now().to_rfc3339();

        for filename in filenames {
            state.entries.insert(filename.clone(), stamp.clone());
            state.pending += 1;
        }

        if state.pending >= WRITE_BATCH_SIZE {
            self.persist(&mut state);
        }
    }

    /// Write any pending entries to disk.
    pub fn flush(&self) -> Result<(), DecksmithError> {
        let mut state = self.lock();
        if state.pending > 0 {
            self.write_ledger(&state.entries)?;
            state.pending = 0;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // A poisoned lock still holds a usable map.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, state: &mut LedgerState) {
        match self.write_ledger(&state.entries) {
            Ok(()) => state.pending = 0,
            Err(e) => warn!("Failed to persist cache ledger: {}", e),
        }
    }

    /// Temp file then rename, so a kill mid-write never corrupts the ledger.
    fn write_ledger(&self, entries: &HashMap<String, String>) -> Result<(), DecksmithError> {
        let parent = self
            .ledger_path
            .parent()
            .ok_or_else(|| DecksmithError::Custom("Cache ledger path has no parent".to_string()))?;
        fs::create_dir_all(parent)?;

        let json = serde_json::to_string_pretty(entries)?;
        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(json.as_bytes())?;
        temp.persist(&self.ledger_path).map_err(|e| DecksmithError::Io(Box::new(e.error)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media_file(dir: &Path, name: &str, bytes: usize) {
        fs::write(dir.join(name), vec![0u8; bytes]).unwrap();
    }

    #[test]
    fn marked_and_flushed_entries_survive_reload() {
        let cache_dir = tempfile::tempdir().unwrap();
        let media_dir = tempfile::tempdir().unwrap();
        media_file(media_dir.path(), "word_abc.mp3", 1200);

        let ledger = CacheLedger::load(cache_dir.path(), media_dir.path(), 500);
        ledger.mark_cached(&["word_abc.mp3".to_string()]);
        ledger.flush().unwrap();

        let reloaded = CacheLedger::load(cache_dir.path(), media_dir.path(), 500);
        assert!(reloaded.is_cached("word_abc.mp3"));
    }

    #[test]
    fn missing_file_evicts_the_entry() {
        let cache_dir = tempfile::tempdir().unwrap();
        let media_dir = tempfile::tempdir().unwrap();

        let ledger = CacheLedger::load(cache_dir.path(), media_dir.path(), 500);
        ledger.mark_cached(&["img_gone.jpg".to_string()]);

        assert!(!ledger.is_cached("img_gone.jpg"));
        assert_eq!(ledger.len(), 0);
    }

    #[test]
    fn undersized_file_counts_as_stale() {
        let cache_dir = tempfile::tempdir().unwrap();
        let media_dir = tempfile::tempdir().unwrap();
        media_file(media_dir.path(), "img_small.jpg", 120);

        let ledger = CacheLedger::load(cache_dir.path(), media_dir.path(), 500);
        ledger.mark_cached(&["img_small.jpg".to_string()]);

        assert!(!ledger.is_cached("img_small.jpg"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn unknown_entry_is_not_cached() {
        let cache_dir = tempfile::tempdir().unwrap();
        let media_dir = tempfile::tempdir().unwrap();

        let ledger = CacheLedger::load(cache_dir.path(), media_dir.path(), 500);
        assert!(!ledger.is_cached("never_marked.mp3"));
    }

    #[test]
    fn batch_threshold_persists_without_explicit_flush() {
        let cache_dir = tempfile::tempdir().unwrap();
        let media_dir = tempfile::tempdir().unwrap();

        let ledger = CacheLedger::load(cache_dir.path(), media_dir.path(), 500);
        let names: Vec<String> = (0..WRITE_BATCH_SIZE).map(|i| format!("word_{i}.mp3")).collect();
        ledger.mark_cached(&names);

        assert!(cache_dir.path().join(LEDGER_FILE).exists());
    }

    #[test]
    fn corrupt_ledger_file_starts_empty() {
        let cache_dir = tempfile::tempdir().unwrap();
        let media_dir = tempfile::tempdir().unwrap();
        fs::write(cache_dir.path().join(LEDGER_FILE), "{not json").unwrap();

        let ledger = CacheLedger::load(cache_dir.path(), media_dir.path(), 500);
        assert!(ledger.is_empty());
    }
}
