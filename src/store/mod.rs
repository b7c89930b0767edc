pub use interval::{Family, Interval, IntervalError, Location};
pub use set::IntervalSet;

mod interval;
mod set;
mod snapshot;

use snapshot::Snapshot;

use chrono::NaiveDate;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(r#"Error while attempting to create store directory "{path}": {error}"#)]
    DirIo {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error(r#"Error while attempting to access "{path}": {error}"#)]
    FileIo {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error(r#"Snapshot "{path}" is corrupted: {error}"#)]
    Corrupted {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error(r#"Marker "{path}" holds invalid date "{value}": {error}"#)]
    InvalidMarker {
        path: PathBuf,
        value: String,
        error: chrono::ParseError,
    },
}

const DEFAULT_STORE_PATH: &str = "data";

#[derive(Clone, Debug, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    path: StorePathConfig,
}

impl StoreConfig {
    pub fn path(&self) -> Option<&Path> {
        self.path.path()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum StorePathConfig {
    Boolean(bool),
    Path(PathBuf),
}

impl Default for StorePathConfig {
    fn default() -> Self {
        Self::Boolean(true)
    }
}

impl StorePathConfig {
    fn path(&self) -> Option<&Path> {
        match self {
            Self::Boolean(false) => None,
            Self::Boolean(true) => Some(Path::new(DEFAULT_STORE_PATH)),
            Self::Path(path) => Some(path),
        }
    }
}

/// Owner of the interval set and its staleness marker.
///
/// Lookups take a snapshot of the current set and never block on a running replacement. Writers
/// are serialized, build the new set aside, persist it and publish it with a single pointer swap.
#[derive(Debug)]
pub struct IntervalStore {
    intervals: RwLock<Arc<IntervalSet>>,
    last_refreshed: RwLock<Option<NaiveDate>>,
    generation: AtomicU64,
    write_lock: Mutex<()>,
    snapshot: Option<Snapshot>,
}

impl IntervalStore {
    /// Store without persistence, starting empty
    pub fn in_memory() -> Self {
        Self::new(IntervalSet::default(), None, None)
    }

    /// Store persisted in `dir`, loading the previous snapshot if there is one
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let snapshot = Snapshot::open(dir)?;
        let decoded = match snapshot.load_intervals() {
            Ok(decoded) => decoded,
            Err(error @ StoreError::Corrupted { .. }) => {
                log::error!("{error}, ignoring it until the next refresh");
                None
            }
            Err(error) => return Err(error),
        };
        let Some(decoded) = decoded else {
            return Ok(Self::new(IntervalSet::default(), None, Some(snapshot)));
        };
        for skipped in &decoded.skipped {
            log::warn!("{}: {skipped}", snapshot.ranges_path().display());
        }
        let last_refreshed = match snapshot.load_marker() {
            Ok(date) => date,
            Err(error @ StoreError::InvalidMarker { .. }) => {
                log::warn!("{error}");
                None
            }
            Err(error) => return Err(error),
        };
        let intervals = IntervalSet::from_intervals(decoded.intervals);
        log::info!(
            r#"Loaded {} ipv4 and {} ipv6 ranges from "{}", last refreshed {}"#,
            intervals.ipv4_len(),
            intervals.ipv6_len(),
            snapshot.ranges_path().display(),
            last_refreshed.map_or_else(|| "never".to_owned(), |date| date.to_string()),
        );
        Ok(Self::new(intervals, last_refreshed, Some(snapshot)))
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        match config.path() {
            Some(dir) => Self::open(dir),
            None => Ok(Self::in_memory()),
        }
    }

    fn new(
        intervals: IntervalSet,
        last_refreshed: Option<NaiveDate>,
        snapshot: Option<Snapshot>,
    ) -> Self {
        Self {
            intervals: RwLock::new(Arc::new(intervals)),
            last_refreshed: RwLock::new(last_refreshed),
            generation: AtomicU64::new(0),
            write_lock: Mutex::new(()),
            snapshot,
        }
    }

    /// Current interval set, unaffected by later replacements
    pub fn intervals(&self) -> Arc<IntervalSet> {
        self.intervals
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Interval containing the address, searching only intervals of the address family
    pub fn find_containing(&self, address: IpAddr) -> Option<Interval> {
        self.intervals().find_containing(address)
    }

    pub fn last_refreshed(&self) -> Option<NaiveDate> {
        *self
            .last_refreshed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of replacements performed by this instance
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn replace_all(&self, intervals: Vec<Interval>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.replace_all_locked(intervals)
    }

    pub fn mark_refreshed(&self, date: NaiveDate) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.mark_refreshed_locked(date)
    }

    /// Replace the whole set, then record `date` as the last refresh
    pub fn replace_and_mark(
        &self,
        intervals: Vec<Interval>,
        date: NaiveDate,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.replace_all_locked(intervals)?;
        self.mark_refreshed_locked(date)
    }

    fn replace_all_locked(&self, intervals: Vec<Interval>) -> Result<(), StoreError> {
        let staged = IntervalSet::from_intervals(intervals);
        if let Some(snapshot) = &self.snapshot {
            snapshot.write_intervals(&staged)?;
        }
        let staged = Arc::new(staged);
        let previous = std::mem::replace(
            &mut *self
                .intervals
                .write()
                .unwrap_or_else(PoisonError::into_inner),
            staged,
        );
        self.generation.fetch_add(1, Ordering::AcqRel);
        // the old set is freed after the write lock is released
        drop(previous);
        Ok(())
    }

    fn mark_refreshed_locked(&self, date: NaiveDate) -> Result<(), StoreError> {
        if let Some(snapshot) = &self.snapshot {
            snapshot.write_marker(date)?;
        }
        *self
            .last_refreshed
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(date);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn interval(start: &str, end: &str, country: &str, continent: &str) -> Interval {
        Interval::new(ip(start), ip(end), country, continent).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    #[test]
    fn starts_empty() {
        let store = IntervalStore::in_memory();
        assert_eq!(store.find_containing(ip("1.1.1.1")), None);
        assert_eq!(store.last_refreshed(), None);
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn find_containing_v4_and_v6() {
        let store = IntervalStore::in_memory();
        store
            .replace_all(vec![
                interval("35.154.192.0", "35.154.255.255", "India", "Asia"),
                interval("2a00:1450::", "2a00:1450::ffff", "Ireland", "Europe"),
            ])
            .unwrap();

        let found = store.find_containing(ip("35.154.199.208")).unwrap();
        assert_eq!(found.country_name(), "India");
        assert_eq!(found.continent_name(), "Asia");
        assert_eq!(found.family(), Family::V4);

        let found = store.find_containing(ip("2a00:1450::1")).unwrap();
        assert_eq!(found.country_name(), "Ireland");
        assert_eq!(found.family(), Family::V6);

        assert_eq!(store.find_containing(ip("35.155.0.0")), None);
        assert_eq!(store.find_containing(ip("2a00:1451::")), None);
    }

    #[test]
    fn replace_is_complete() {
        let store = IntervalStore::in_memory();
        store
            .replace_all(vec![interval("10.0.0.0", "10.0.0.255", "Old", "Old")])
            .unwrap();
        let before = store.intervals();
        store
            .replace_all(vec![interval("10.0.1.0", "10.0.1.255", "New", "New")])
            .unwrap();

        // a reader holding the old set keeps seeing all of it
        assert_eq!(
            before.find_containing(ip("10.0.0.1")).unwrap().country_name(),
            "Old"
        );
        assert_eq!(before.find_containing(ip("10.0.1.1")), None);

        assert_eq!(store.find_containing(ip("10.0.0.1")), None);
        assert_eq!(
            store.find_containing(ip("10.0.1.1")).unwrap().country_name(),
            "New"
        );
        assert_eq!(store.generation(), 2);
    }

    #[test]
    fn overlapping_intervals_narrowest_wins() {
        let store = IntervalStore::in_memory();
        store
            .replace_all(vec![
                interval("10.0.0.0", "10.255.255.255", "Wide", "W"),
                interval("10.1.0.0", "10.1.0.255", "Narrow", "N"),
            ])
            .unwrap();
        assert_eq!(
            store.find_containing(ip("10.1.0.7")).unwrap().country_name(),
            "Narrow"
        );
        assert_eq!(
            store.find_containing(ip("10.2.0.7")).unwrap().country_name(),
            "Wide"
        );
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = IntervalStore::open(dir.path()).unwrap();
            assert_eq!(store.last_refreshed(), None);
            store
                .replace_and_mark(
                    vec![interval("10.0.0.0", "10.0.0.255", "Private", "LAN")],
                    date(3),
                )
                .unwrap();
        }
        let store = IntervalStore::open(dir.path()).unwrap();
        assert_eq!(store.last_refreshed(), Some(date(3)));
        assert_eq!(
            store.find_containing(ip("10.0.0.42")).unwrap().country_name(),
            "Private"
        );
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn mark_refreshed_keeps_intervals() {
        let store = IntervalStore::in_memory();
        store.mark_refreshed(date(1)).unwrap();
        assert_eq!(store.last_refreshed(), Some(date(1)));
        assert_eq!(store.generation(), 0);

        let dir = tempfile::tempdir().unwrap();
        {
            let store = IntervalStore::open(dir.path()).unwrap();
            store
                .replace_all(vec![interval("10.0.0.0", "10.0.0.255", "Private", "LAN")])
                .unwrap();
            assert_eq!(store.last_refreshed(), None);
            store.mark_refreshed(date(4)).unwrap();
            assert_eq!(store.last_refreshed(), Some(date(4)));
            assert_eq!(store.generation(), 1);
        }
        assert_eq!(
            fs::read_to_string(dir.path().join("last_update")).unwrap(),
            "2024-05-04\n"
        );
        let store = IntervalStore::open(dir.path()).unwrap();
        assert_eq!(store.last_refreshed(), Some(date(4)));
        assert!(store.find_containing(ip("10.0.0.42")).is_some());
    }

    #[test]
    fn corrupted_snapshot_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = IntervalStore::open(dir.path()).unwrap();
            store
                .replace_and_mark(vec![interval("1.0.0.0", "1.0.0.255", "A", "a")], date(1))
                .unwrap();
        }
        fs::write(dir.path().join("ranges.jsonl.gz"), b"garbage").unwrap();
        let store = IntervalStore::open(dir.path()).unwrap();
        assert_eq!(store.find_containing(ip("1.0.0.1")), None);
        // the marker must not claim freshness for data we do not have
        assert_eq!(store.last_refreshed(), None);
    }

    #[test]
    fn failed_persist_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntervalStore::open(dir.path()).unwrap();
        store
            .replace_and_mark(vec![interval("1.0.0.0", "1.0.0.255", "A", "a")], date(1))
            .unwrap();

        fs::create_dir(dir.path().join("ranges.jsonl.gz.tmp")).unwrap();
        let result =
            store.replace_and_mark(vec![interval("2.0.0.0", "2.0.0.255", "B", "b")], date(2));
        assert!(matches!(result, Err(StoreError::FileIo { .. })));

        assert_eq!(store.last_refreshed(), Some(date(1)));
        assert_eq!(store.generation(), 1);
        assert!(store.find_containing(ip("1.0.0.1")).is_some());
        assert!(store.find_containing(ip("2.0.0.1")).is_none());

        let reopened = IntervalStore::open(dir.path()).unwrap();
        assert_eq!(reopened.last_refreshed(), Some(date(1)));
        assert!(reopened.find_containing(ip("1.0.0.1")).is_some());
    }

    #[test]
    fn store_config_path() {
        let config: StoreConfig = toml::from_str("").unwrap();
        assert_eq!(config.path(), Some(Path::new("data")));
        let config: StoreConfig = toml::from_str("path = false").unwrap();
        assert_eq!(config.path(), None);
        let config: StoreConfig = toml::from_str(r#"path = "/var/lib/geolookup""#).unwrap();
        assert_eq!(config.path(), Some(Path::new("/var/lib/geolookup")));
    }
}
