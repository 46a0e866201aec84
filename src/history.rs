//! history.rs: bounded in-memory log of run reports, served on `/runs`.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::report::RunReport;

pub const DEFAULT_CAPACITY: usize = 50;
const MAX_CAPACITY: usize = 10_000;

#[derive(Debug)]
pub struct RunHistory {
    inner: Mutex<VecDeque<RunReport>>,
    cap: usize,
}

impl Default for RunHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl RunHistory {
    pub fn with_capacity(cap: usize) -> Self {
        let cap = cap.clamp(1, MAX_CAPACITY);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    pub fn push(&self, report: RunReport) {
        // Entries are only ever appended whole; a poisoned log is still a valid log.
        let mut v = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        v.push_back(report);
        while v.len() > self.cap {
            v.pop_front();
        }
    }

    /// Up to `n` most recent reports, oldest first.
    pub fn snapshot_last_n(&self, n: usize) -> Vec<RunReport> {
        let v = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let start = v.len().saturating_sub(n);
        v.iter().skip(start).cloned().collect()
    }

    pub fn last(&self) -> Option<RunReport> {
        let v = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        v.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
