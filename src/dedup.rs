// src/dedup.rs
//! Seen-article store. An id is admitted at most once per retention period, across runs.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::article::{Article, ArticleId};
use crate::error::DedupError;

#[derive(Debug, Default)]
pub struct DedupStore {
    seen: Mutex<HashMap<ArticleId, DateTime<Utc>>>,
    /// `None` keeps ids forever.
    retention: Option<ChronoDuration>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention_days(days: u32) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            retention: (days > 0).then(|| ChronoDuration::days(i64::from(days))),
        }
    }

    /// Keep only never-seen articles, in input order, and mark them seen.
    /// Check and insert happen under one lock, so concurrent runs cannot both admit an id.
    pub fn admit(
        &self,
        articles: Vec<Article>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Article>, DedupError> {
        let mut seen = self.seen.lock().map_err(|_| DedupError::Poisoned)?;
        if let Some(keep) = self.retention {
            let cutoff = now - keep;
            seen.retain(|_, at| *at >= cutoff);
        }

        let before = seen.len();
        let total = articles.len();
        let mut fresh = Vec::with_capacity(total);
        let mut inserted = 0usize;
        for a in articles {
            if seen.contains_key(&a.id) {
                continue;
            }
            if seen.insert(a.id.clone(), now).is_none() {
                inserted += 1;
            }
            fresh.push(a);
        }

        if inserted != fresh.len() || seen.len() != before + inserted {
            return Err(DedupError::Inconsistent {
                expected: before + fresh.len(),
                actual: seen.len(),
            });
        }
        counter!("brief_dedup_dropped_total").increment((total - fresh.len()) as u64);
        Ok(fresh)
    }

    pub fn contains(&self, id: &ArticleId) -> Result<bool, DedupError> {
        let seen = self.seen.lock().map_err(|_| DedupError::Poisoned)?;
        Ok(seen.contains_key(id))
    }

    /// Return ids to the unseen pool (e.g. their batch never made it into a digest).
    pub fn forget<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a ArticleId>,
    ) -> Result<usize, DedupError> {
        let mut seen = self.seen.lock().map_err(|_| DedupError::Poisoned)?;
        Ok(ids.into_iter().filter(|id| seen.remove(*id).is_some()).count())
    }

    pub fn len(&self) -> Result<usize, DedupError> {
        Ok(self.seen.lock().map_err(|_| DedupError::Poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, DedupError> {
        Ok(self.len()? == 0)
    }

    /// Write `{id: seen_at}` as JSON (tmp file + rename).
    pub fn save_to(&self, path: &Path) -> Result<(), DedupError> {
        let snapshot: BTreeMap<ArticleId, DateTime<Utc>> = {
            let seen = self.seen.lock().map_err(|_| DedupError::Poisoned)?;
            seen.iter().map(|(k, v)| (k.clone(), *v)).collect()
        };
        write_atomically(path, &snapshot).map_err(|e| DedupError::Snapshot(e.to_string()))
    }

    /// Merge a snapshot into the store. A missing file is an empty snapshot.
    pub fn load_from(&self, path: &Path) -> Result<usize, DedupError> {
        let s = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(DedupError::Snapshot(e.to_string())),
        };
        let snapshot: HashMap<ArticleId, DateTime<Utc>> =
            serde_json::from_str(&s).map_err(|e| DedupError::Snapshot(e.to_string()))?;
        let n = snapshot.len();
        let mut seen = self.seen.lock().map_err(|_| DedupError::Poisoned)?;
        for (id, at) in snapshot {
            let slot = seen.entry(id).or_insert(at);
            if at > *slot {
                *slot = at;
            }
        }
        Ok(n)
    }
}

fn write_atomically<T: serde::Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let tmp = path.with_extension("json.tmp");
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    f.sync_all()?;
    fs::rename(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, 9, 0, 0).unwrap()
    }

    fn article(source: &str, url: &str) -> Article {
        Article {
            id: ArticleId::derive(source, url),
            source: source.into(),
            title: url.into(),
            content: String::new(),
            url: url.into(),
            published_at: t0(),
            fetched_at: t0(),
        }
    }

    #[test]
    fn second_admit_of_same_ids_is_empty() {
        let store = DedupStore::new();
        let batch = vec![article("a", "https://x.test/1"), article("a", "https://x.test/2")];
        assert_eq!(store.admit(batch.clone(), t0()).unwrap().len(), 2);
        assert!(store.admit(batch, t0()).unwrap().is_empty());
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn duplicates_inside_one_batch_keep_the_first() {
        let store = DedupStore::new();
        let a = article("a", "https://x.test/1");
        let out = store.admit(vec![a.clone(), a.clone()], t0()).unwrap();
        assert_eq!(out, vec![a]);
    }

    #[test]
    fn retention_evicts_old_ids() {
        let store = DedupStore::with_retention_days(1);
        let a = article("a", "https://x.test/1");
        store.admit(vec![a.clone()], t0()).unwrap();
        assert!(store.admit(vec![a.clone()], t0() + ChronoDuration::hours(23)).unwrap().is_empty());
        let later = t0() + ChronoDuration::days(2);
        assert_eq!(store.admit(vec![a], later).unwrap().len(), 1);
    }

    #[test]
    fn forgotten_ids_are_admitted_again() {
        let store = DedupStore::new();
        let a = article("a", "https://x.test/1");
        store.admit(vec![a.clone()], t0()).unwrap();
        assert_eq!(store.forget([&a.id]).unwrap(), 1);
        assert!(!store.contains(&a.id).unwrap());
        assert_eq!(store.admit(vec![a], t0()).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_admits_hand_out_each_id_once() {
        let store = Arc::new(DedupStore::new());
        let urls: Vec<String> = (0..200).map(|i| format!("https://x.test/{i}")).collect();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                // Overlapping windows: thread t covers urls[t*40 .. t*40+80].
                let batch: Vec<Article> = urls[t * 40..t * 40 + 80]
                    .iter()
                    .map(|u| article("a", u))
                    .collect();
                std::thread::spawn(move || store.admit(batch, t0()).unwrap())
            })
            .collect();

        let mut admitted: Vec<ArticleId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .map(|a| a.id)
            .collect();
        let total = admitted.len();
        admitted.sort();
        admitted.dedup();
        assert_eq!(total, admitted.len(), "an id was admitted twice");
        assert_eq!(total, 200);
        assert_eq!(store.len().unwrap(), 200);
    }

    #[test]
    fn poisoned_lock_is_reported() {
        let store = Arc::new(DedupStore::new());
        let s = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = s.seen.lock().unwrap();
            panic!("writer crashed");
        })
        .join();
        assert!(matches!(
            store.admit(vec![article("a", "https://x.test/1")], t0()),
            Err(DedupError::Poisoned)
        ));
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("seen.json");
        let store = DedupStore::new();
        let a = article("a", "https://x.test/1");
        store.admit(vec![a.clone()], t0()).unwrap();
        store.save_to(&path).unwrap();

        let fresh = DedupStore::new();
        assert_eq!(fresh.load_from(&path).unwrap(), 1);
        assert!(fresh.contains(&a.id).unwrap());
        assert_eq!(DedupStore::new().load_from(&dir.path().join("missing.json")).unwrap(), 0);
    }
}
