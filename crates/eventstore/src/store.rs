//! File-backed event store.
//!
//! Layout per aggregate:
//! `<root>/<aggregate-id>/events/<6-digit-version>_<sanitized-type>.json`
//! plus an optional `<root>/<aggregate-id>/snapshot.json`. Sorting event
//! filenames lexicographically recovers insertion order.
//!
//! The store assumes a single writer per aggregate; the expected-version
//! check provides optimistic concurrency, and readers never block
//! writers at filesystem level.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use fathom_domain::error::{Error, Result};
use fathom_domain::event::EventEnvelope;

/// Opaque serialized aggregate state at a version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub aggregate_id: String,
    pub version: u64,
    pub state: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

pub struct FileEventStore {
    root: PathBuf,
    /// Serializes the version check against the writes that follow it,
    /// so two in-process appends with the same expected version cannot
    /// both pass the check.
    append_lock: Mutex<()>,
}

impl FileEventStore {
    /// Open (and create) the store root.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(Error::Io)?;
        tracing::info!(path = %root.display(), "event store ready");
        Ok(Self {
            root,
            append_lock: Mutex::new(()),
        })
    }

    fn events_dir(&self, aggregate_id: &str) -> PathBuf {
        self.root.join(sanitize_id(aggregate_id)).join("events")
    }

    fn snapshot_path(&self, aggregate_id: &str) -> PathBuf {
        self.root.join(sanitize_id(aggregate_id)).join("snapshot.json")
    }

    // ── Appending ──────────────────────────────────────────────────

    /// Append events to an aggregate's log.
    ///
    /// The current version is the highest one present (0 if none).
    /// When `expected_version > 0` and it does not match, nothing is
    /// written and `Error::VersionConflict` is returned. Each event is
    /// written atomically (temp file + rename).
    pub fn append_events(
        &self,
        aggregate_id: &str,
        events: &[EventEnvelope],
        expected_version: u64,
    ) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let dir = self.events_dir(aggregate_id);
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let _guard = self.append_lock.lock();
        let current_version = self.current_version(aggregate_id)?;
        if expected_version > 0 && current_version != expected_version {
            return Err(Error::VersionConflict {
                aggregate_id: aggregate_id.to_string(),
                expected: expected_version,
                actual: current_version,
            });
        }

        for event in events {
            let filename = format!("{:06}_{}.json", event.version, event.sanitized_type());
            let path = dir.join(&filename);
            write_atomic(&path, &serde_json::to_vec_pretty(event)?)?;
            tracing::debug!(
                aggregate_id,
                version = event.version,
                event_type = event.event_type(),
                "event appended"
            );
        }

        Ok(())
    }

    /// Highest event version present for an aggregate, 0 if none.
    pub fn current_version(&self, aggregate_id: &str) -> Result<u64> {
        let dir = self.events_dir(aggregate_id);
        if !dir.exists() {
            return Ok(0);
        }

        let mut max = 0;
        for entry in std::fs::read_dir(&dir).map_err(Error::Io)? {
            let entry = entry.map_err(Error::Io)?;
            if let Some(version) = parse_version(&entry.file_name().to_string_lossy()) {
                max = max.max(version);
            }
        }
        Ok(max)
    }

    // ── Loading ────────────────────────────────────────────────────

    /// All events for an aggregate, in version order.
    pub fn load_events(&self, aggregate_id: &str) -> Result<Vec<EventEnvelope>> {
        self.load_events_from(aggregate_id, 0)
    }

    /// Events with version strictly greater than `from_version`.
    pub fn load_events_from(
        &self,
        aggregate_id: &str,
        from_version: u64,
    ) -> Result<Vec<EventEnvelope>> {
        let dir = self.events_dir(aggregate_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut filenames: Vec<String> = std::fs::read_dir(&dir)
            .map_err(Error::Io)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".json"))
            .collect();
        // Zero-padded version prefixes make lexicographic order equal
        // insertion order.
        filenames.sort();

        let mut events = Vec::with_capacity(filenames.len());
        for name in filenames {
            let raw = std::fs::read_to_string(dir.join(&name)).map_err(Error::Io)?;
            let event: EventEnvelope = serde_json::from_str(&raw)
                .map_err(|e| Error::Other(format!("corrupt event file {name}: {e}")))?;
            if event.version > from_version {
                events.push(event);
            }
        }
        Ok(events)
    }

    // ── Snapshots ──────────────────────────────────────────────────

    /// Load the aggregate's snapshot; absence is `None`, not an error.
    pub fn load_snapshot(&self, aggregate_id: &str) -> Result<Option<Snapshot>> {
        let path = self.snapshot_path(aggregate_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let path = self.snapshot_path(&snapshot.aggregate_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        write_atomic(&path, &serde_json::to_vec_pretty(snapshot)?)?;
        tracing::debug!(
            aggregate_id = %snapshot.aggregate_id,
            version = snapshot.version,
            "snapshot saved"
        );
        Ok(())
    }

    // ── Listing ────────────────────────────────────────────────────

    /// All aggregate ids present in the store, sorted.
    pub fn all_aggregate_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(Error::Io)? {
            let entry = entry.map_err(Error::Io)?;
            if entry.file_type().map_err(Error::Io)?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Write bytes to `path` atomically: temp file in the same directory,
/// then rename over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp = parent.join(format!(
        ".{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "event".into())
    ));
    std::fs::write(&tmp, bytes).map_err(Error::Io)?;
    std::fs::rename(&tmp, path).map_err(Error::Io)?;
    Ok(())
}

fn parse_version(filename: &str) -> Option<u64> {
    filename.split('_').next()?.parse().ok()
}

/// Keep aggregate directories filesystem-safe.
fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fathom_domain::event::EventPayload;
    use fathom_domain::research::ResearchMode;

    fn started(aggregate_id: &str, version: u64) -> EventEnvelope {
        EventEnvelope::new(
            aggregate_id,
            version,
            EventPayload::ResearchStarted {
                query: "q".into(),
                mode: ResearchMode::Fast,
            },
        )
    }

    fn completed(aggregate_id: &str, version: u64) -> EventEnvelope {
        EventEnvelope::new(aggregate_id, version, EventPayload::ResearchCompleted {})
    }

    #[test]
    fn append_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path()).unwrap();

        let events = vec![started("agg", 1), completed("agg", 2)];
        store.append_events("agg", &events, 0).unwrap();

        let loaded = store.load_events("agg").unwrap();
        assert_eq!(loaded, events);
        assert_eq!(store.current_version("agg").unwrap(), 2);
    }

    #[test]
    fn filenames_carry_version_and_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path()).unwrap();
        store.append_events("agg", &[started("agg", 1)], 0).unwrap();

        let events_dir = dir.path().join("agg").join("events");
        let names: Vec<String> = std::fs::read_dir(events_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["000001_research_started.json"]);
    }

    #[test]
    fn load_events_from_filters_by_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path()).unwrap();
        store
            .append_events("agg", &[started("agg", 1), completed("agg", 2)], 0)
            .unwrap();

        let tail = store.load_events_from("agg", 1).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].version, 2);
    }

    #[test]
    fn version_conflict_on_stale_expected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path()).unwrap();
        store.append_events("agg", &[started("agg", 1)], 0).unwrap();

        // Writer believes the log is at version 3; it is at 1.
        let err = store.append_events("agg", &[completed("agg", 4)], 3);
        assert!(matches!(
            err,
            Err(Error::VersionConflict {
                expected: 3,
                actual: 1,
                ..
            })
        ));
        assert_eq!(store.current_version("agg").unwrap(), 1);
    }

    #[test]
    fn expected_version_zero_skips_the_check() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path()).unwrap();
        store.append_events("agg", &[started("agg", 1)], 0).unwrap();
        store.append_events("agg", &[completed("agg", 2)], 0).unwrap();
        assert_eq!(store.current_version("agg").unwrap(), 2);
    }

    #[test]
    fn matching_expected_version_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path()).unwrap();
        store.append_events("agg", &[started("agg", 1)], 0).unwrap();
        store.append_events("agg", &[completed("agg", 2)], 1).unwrap();
        assert_eq!(store.load_events("agg").unwrap().len(), 2);
    }

    #[test]
    fn snapshot_roundtrip_and_absence() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path()).unwrap();

        assert!(store.load_snapshot("agg").unwrap().is_none());

        let snapshot = Snapshot {
            aggregate_id: "agg".into(),
            version: 3,
            state: serde_json::json!({"status": "searching"}),
            timestamp: Utc::now(),
        };
        store.save_snapshot(&snapshot).unwrap();

        let loaded = store.load_snapshot("agg").unwrap().unwrap();
        assert_eq!(loaded.version, 3);
        assert_eq!(loaded.state["status"], "searching");
    }

    #[test]
    fn lists_aggregate_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path()).unwrap();
        store.append_events("bbb", &[started("bbb", 1)], 0).unwrap();
        store.append_events("aaa", &[started("aaa", 1)], 0).unwrap();

        assert_eq!(store.all_aggregate_ids().unwrap(), vec!["aaa", "bbb"]);
    }

    #[test]
    fn concurrent_appends_with_same_expected_version_race_once() {
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileEventStore::new(dir.path()).unwrap());
        store
            .append_events(
                "agg",
                &[started("agg", 1), completed("agg", 2), started("agg", 3)],
                0,
            )
            .unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store.append_events("agg", &[completed("agg", 4)], 3)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(Error::VersionConflict { .. })))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 1);
        assert_eq!(store.current_version("agg").unwrap(), 4);
    }

    #[test]
    fn empty_append_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEventStore::new(dir.path()).unwrap();
        store.append_events("agg", &[], 5).unwrap();
        assert_eq!(store.current_version("agg").unwrap(), 0);
    }
}
