// src/ratelimit.rs
//! Per-source quota windows. `acquire` never waits: it answers "may this call happen now?"
//! and consumes one unit if so. Day windows roll over at UTC midnight, minute windows at the
//! wall-clock minute.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::config::{QuotaUnit, SourceConfig};
use crate::error::RateLimitExceeded;

/// Start of the window containing `now`.
pub fn window_start(unit: QuotaUnit, now: DateTime<Utc>) -> DateTime<Utc> {
    let ts = now.timestamp();
    let aligned = match unit {
        QuotaUnit::PerDay => ts - ts.rem_euclid(86_400),
        QuotaUnit::PerMinute => ts - ts.rem_euclid(60),
    };
    Utc.timestamp_opt(aligned, 0).single().unwrap_or(now)
}

fn window_len(unit: QuotaUnit) -> ChronoDuration {
    match unit {
        QuotaUnit::PerDay => ChronoDuration::days(1),
        QuotaUnit::PerMinute => ChronoDuration::minutes(1),
    }
}

/// Proof that one unit of quota was consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permit {
    pub source_id: String,
    pub window_start: DateTime<Utc>,
    /// Units left in this window after this permit (`None` = unlimited).
    pub remaining: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub window_start: DateTime<Utc>,
    pub used: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    source_id: String,
    /// `None` = unlimited.
    quota: Option<u32>,
    unit: QuotaUnit,
    state: Mutex<WindowSnapshot>,
}

impl RateLimiter {
    pub fn new(source_id: impl Into<String>, quota: Option<u32>, unit: QuotaUnit) -> Self {
        let now = Utc::now();
        Self {
            source_id: source_id.into(),
            quota,
            unit,
            state: Mutex::new(WindowSnapshot {
                window_start: window_start(unit, now),
                used: 0,
            }),
        }
    }

    pub fn for_source(cfg: &SourceConfig) -> Self {
        Self::new(cfg.name.clone(), cfg.rate_limit, cfg.quota_unit())
    }

    pub fn unit(&self) -> QuotaUnit {
        self.unit
    }

    pub fn quota(&self) -> Option<u32> {
        self.quota
    }

    pub fn acquire(&self) -> Result<Permit, RateLimitExceeded> {
        self.acquire_at(Utc::now())
    }

    /// Check-and-consume under one lock, so concurrent callers never oversell the window.
    pub fn acquire_at(&self, now: DateTime<Utc>) -> Result<Permit, RateLimitExceeded> {
        let current = window_start(self.unit, now);
        // A poisoned counter is still a valid counter: every update is a single store.
        let mut st = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if current > st.window_start {
            st.window_start = current;
            st.used = 0;
        }

        let Some(quota) = self.quota else {
            st.used = st.used.saturating_add(1);
            return Ok(Permit {
                source_id: self.source_id.clone(),
                window_start: st.window_start,
                remaining: None,
            });
        };

        if st.used >= quota {
            return Err(RateLimitExceeded {
                source_id: self.source_id.clone(),
                quota,
                unit: self.unit,
                resets_at: st.window_start + window_len(self.unit),
            });
        }
        st.used += 1;
        Ok(Permit {
            source_id: self.source_id.clone(),
            window_start: st.window_start,
            remaining: Some(quota - st.used),
        })
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Restore usage from a previous process. Older windows are ignored by the next acquire.
    pub fn restore(&self, snap: WindowSnapshot) {
        let mut st = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if snap.window_start >= st.window_start {
            *st = snap;
        }
    }
}

/// One limiter per configured source, keyed by source name.
#[derive(Debug, Clone, Default)]
pub struct RateLimiterRegistry {
    limiters: HashMap<String, Arc<RateLimiter>>,
}

impl RateLimiterRegistry {
    pub fn from_sources<'a>(sources: impl IntoIterator<Item = &'a SourceConfig>) -> Self {
        let limiters = sources
            .into_iter()
            .map(|s| (s.name.clone(), Arc::new(RateLimiter::for_source(s))))
            .collect();
        Self { limiters }
    }

    pub fn insert(&mut self, limiter: RateLimiter) {
        self.limiters
            .insert(limiter.source_id.clone(), Arc::new(limiter));
    }

    pub fn get(&self, source_id: &str) -> Option<Arc<RateLimiter>> {
        self.limiters.get(source_id).cloned()
    }

    pub fn acquire(&self, source_id: &str) -> Result<Permit, RateLimitExceeded> {
        self.acquire_at(source_id, Utc::now())
    }

    /// Unknown sources have no quota to spend and are always denied.
    pub fn acquire_at(
        &self,
        source_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Permit, RateLimitExceeded> {
        match self.limiters.get(source_id) {
            Some(l) => l.acquire_at(now),
            None => {
                tracing::warn!(target: "ratelimit", source = source_id, "no limiter configured");
                Err(RateLimitExceeded {
                    source_id: source_id.to_string(),
                    quota: 0,
                    unit: QuotaUnit::PerMinute,
                    resets_at: now,
                })
            }
        }
    }

    pub fn snapshot(&self) -> HashMap<String, WindowSnapshot> {
        self.limiters
            .iter()
            .map(|(k, v)| (k.clone(), v.snapshot()))
            .collect()
    }

    /// Persist window usage (tmp file + rename).
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp)?;
        f.write_all(json.as_bytes())?;
        fs::rename(tmp, path)
    }

    /// Missing file is not an error; entries for unknown sources are ignored.
    pub fn load_from(&self, path: &Path) -> io::Result<()> {
        let s = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let snaps: HashMap<String, WindowSnapshot> =
            serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        for (name, snap) in snaps {
            if let Some(l) = self.limiters.get(&name) {
                l.restore(snap);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 6, h, m, s).unwrap()
    }

    #[test]
    fn minute_window_resets_exactly_at_boundary() {
        let rl = RateLimiter::new("reddit", Some(2), QuotaUnit::PerMinute);
        assert!(rl.acquire_at(at(9, 0, 1)).is_ok());
        assert!(rl.acquire_at(at(9, 0, 30)).is_ok());
        let denied = rl.acquire_at(at(9, 0, 59)).unwrap_err();
        assert_eq!(denied.resets_at, at(9, 1, 0));
        assert!(rl.acquire_at(at(9, 1, 0)).is_ok());
    }

    #[test]
    fn day_window_rolls_over_at_midnight() {
        let rl = RateLimiter::new("newsapi", Some(1), QuotaUnit::PerDay);
        assert!(rl.acquire_at(at(0, 0, 0)).is_ok());
        assert!(rl.acquire_at(at(23, 59, 59)).is_err());
        let next = Utc.with_ymd_and_hms(2025, 9, 7, 0, 0, 0).unwrap();
        let p = rl.acquire_at(next).unwrap();
        assert_eq!(p.remaining, Some(0));
    }

    #[test]
    fn zero_quota_denies_and_none_is_unlimited() {
        let zero = RateLimiter::new("off", Some(0), QuotaUnit::PerMinute);
        assert!(zero.acquire_at(at(1, 0, 0)).is_err());

        let open = RateLimiter::new("open", None, QuotaUnit::PerMinute);
        for _ in 0..1000 {
            assert!(open.acquire_at(at(1, 0, 0)).is_ok());
        }
    }

    #[test]
    fn clock_going_backwards_gives_no_credit() {
        let rl = RateLimiter::new("x", Some(1), QuotaUnit::PerMinute);
        assert!(rl.acquire_at(at(9, 5, 0)).is_ok());
        assert!(rl.acquire_at(at(9, 4, 0)).is_err());
    }

    #[test]
    fn concurrent_callers_never_oversell_the_window() {
        let rl = Arc::new(RateLimiter::new("newsapi", Some(25), QuotaUnit::PerDay));
        let now = at(12, 0, 0);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rl = rl.clone();
                std::thread::spawn(move || (0..10).filter(|_| rl.acquire_at(now).is_ok()).count())
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 25);
        assert!(rl.acquire_at(now).is_err());
    }

    #[test]
    fn registry_denies_unknown_sources() {
        let reg = RateLimiterRegistry::default();
        assert!(reg.acquire_at("ghost", at(1, 0, 0)).is_err());
    }

    #[test]
    fn snapshot_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limits.json");

        let mut reg = RateLimiterRegistry::default();
        reg.insert(RateLimiter::new("newsapi", Some(3), QuotaUnit::PerDay));
        let now = Utc::now();
        reg.acquire_at("newsapi", now).unwrap();
        reg.acquire_at("newsapi", now).unwrap();
        reg.save_to(&path).unwrap();

        let mut fresh = RateLimiterRegistry::default();
        fresh.insert(RateLimiter::new("newsapi", Some(3), QuotaUnit::PerDay));
        fresh.load_from(&path).unwrap();
        assert!(fresh.acquire_at("newsapi", now).is_ok());
        assert!(fresh.acquire_at("newsapi", now).is_err());
    }
}
