//! Copy-on-write pattern store
//!
//! Readers take an immutable [`PatternSnapshot`] with a single atomic load
//! and never block. Writers serialize on a mutex, clone the key map (the
//! patterns themselves are shared `Arc`s), replace the patterns they touch
//! and publish the new snapshot atomically. A reader therefore sees every
//! pattern either entirely before or entirely after an update.

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use super::QueryPattern;

/// Immutable view of all patterns at one point in time
#[derive(Debug, Clone, Default)]
pub struct PatternSnapshot {
    patterns: HashMap<String, Arc<QueryPattern>>,
    version: u64,
}

impl PatternSnapshot {
    /// Looks up a pattern by key
    pub fn get(&self, key: &str) -> Option<&QueryPattern> {
        self.patterns.get(key).map(Arc::as_ref)
    }

    /// Number of patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the snapshot holds no patterns
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Monotonic version, bumped on every published change
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Iterates over all patterns in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = &QueryPattern> {
        self.patterns.values().map(Arc::as_ref)
    }

    /// Whether `key` still maps to the very same pattern in `other`
    fn unchanged_in(&self, other: &PatternSnapshot, key: &str) -> bool {
        match (self.patterns.get(key), other.patterns.get(key)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Outcome of applying an optimization pass to the live store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptimizationCommit {
    /// Keys removed from the store
    pub pruned: Vec<String>,
    /// Patterns whose success rate was rewritten
    pub recomputed: Vec<Arc<QueryPattern>>,
    /// Patterns left in the store
    pub retained: usize,
}

/// Shared, concurrently readable pattern store
#[derive(Debug)]
pub struct PatternStore {
    current: ArcSwap<PatternSnapshot>,
    writer: Mutex<()>,
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(PatternSnapshot::default()),
            writer: Mutex::new(()),
        }
    }

    /// Creates a store holding the given patterns
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::Utc;
    /// use warehouse_router::patterns::{PatternStore, QueryPattern};
    ///
    /// let store = PatternStore::from_patterns(vec![QueryPattern::new("question", Utc::now())]);
    /// assert_eq!(store.snapshot().len(), 1);
    /// ```
    pub fn from_patterns(patterns: impl IntoIterator<Item = QueryPattern>) -> Self {
        let patterns = patterns
            .into_iter()
            .map(|p| (p.key.clone(), Arc::new(p)))
            .collect();
        Self {
            current: ArcSwap::from_pointee(PatternSnapshot {
                patterns,
                version: 0,
            }),
            writer: Mutex::new(()),
        }
    }

    fn write_guard(&self) -> MutexGuard<'_, ()> {
        // The guard protects no data of its own, so a poisoned lock is safe to reuse.
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the current snapshot without blocking
    pub fn snapshot(&self) -> Arc<PatternSnapshot> {
        self.current.load_full()
    }

    /// Applies `apply` to the patterns under `keys`, creating missing ones
    ///
    /// Every touched pattern gets `last_seen = now`. Returns the updated
    /// patterns.
    pub fn update<F>(&self, keys: &[String], now: DateTime<Utc>, apply: F) -> Vec<Arc<QueryPattern>>
    where
        F: FnMut(&mut QueryPattern),
    {
        match self.try_update(keys, now, apply, |_| Ok::<(), Infallible>(())) {
            Ok(updated) => updated,
            Err(never) => match never {},
        }
    }

    /// Like [`PatternStore::update`], but hands the updated patterns to
    /// `persist` before publishing them
    ///
    /// `persist` runs under the writer lock, so durable writes land in the
    /// same order as published snapshots. If it fails nothing is published.
    pub fn try_update<F, S, E>(
        &self,
        keys: &[String],
        now: DateTime<Utc>,
        mut apply: F,
        persist: S,
    ) -> Result<Vec<Arc<QueryPattern>>, E>
    where
        F: FnMut(&mut QueryPattern),
        S: FnOnce(&[Arc<QueryPattern>]) -> Result<(), E>,
    {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.write_guard();
        let base = self.current.load_full();
        let mut patterns = base.patterns.clone();
        let mut updated = Vec::with_capacity(keys.len());

        let unique: HashSet<&String> = keys.iter().collect();
        for key in unique {
            let mut pattern = patterns
                .get(key)
                .map(|p| QueryPattern::clone(p))
                .unwrap_or_else(|| QueryPattern::new(key.clone(), now));
            apply(&mut pattern);
            pattern.last_seen = now;
            let pattern = Arc::new(pattern);
            patterns.insert(key.clone(), Arc::clone(&pattern));
            updated.push(pattern);
        }

        persist(&updated)?;
        self.current.store(Arc::new(PatternSnapshot {
            patterns,
            version: base.version + 1,
        }));
        Ok(updated)
    }

    /// Publishes the result of an optimization computed on `base`
    ///
    /// `prune` lists candidate keys and `recomputed` the patterns with a
    /// fresh success rate, both derived from `base` without holding any
    /// lock. Under the writer lock each candidate is re-checked against the
    /// live snapshot: a key is removed only if `still_prunable` holds for its
    /// current pattern, and a recomputed pattern replaces the live one only
    /// if nobody touched it since `base` (otherwise the rate is recomputed
    /// on the live pattern).
    pub fn commit_optimization<P>(
        &self,
        base: &PatternSnapshot,
        prune: &[String],
        recomputed: Vec<QueryPattern>,
        still_prunable: P,
    ) -> OptimizationCommit
    where
        P: Fn(&QueryPattern) -> bool,
    {
        let persist = |_: &OptimizationCommit| Ok::<(), Infallible>(());
        match self.try_commit_optimization(base, prune, recomputed, still_prunable, persist) {
            Ok(commit) => commit,
            Err(never) => match never {},
        }
    }

    /// Like [`PatternStore::commit_optimization`], but hands the commit to
    /// `persist` under the writer lock before publishing it
    pub fn try_commit_optimization<P, S, E>(
        &self,
        base: &PatternSnapshot,
        prune: &[String],
        recomputed: Vec<QueryPattern>,
        still_prunable: P,
        persist: S,
    ) -> Result<OptimizationCommit, E>
    where
        P: Fn(&QueryPattern) -> bool,
        S: FnOnce(&OptimizationCommit) -> Result<(), E>,
    {
        let _guard = self.write_guard();
        let live = self.current.load_full();
        let mut patterns = live.patterns.clone();
        let mut commit = OptimizationCommit::default();

        for key in prune {
            let remove = patterns.get(key).map(|p| still_prunable(p)).unwrap_or(false);
            if remove {
                patterns.remove(key);
                commit.pruned.push(key.clone());
            }
        }

        for pattern in recomputed {
            let key = pattern.key.clone();
            if !patterns.contains_key(&key) {
                continue;
            }
            let fresh = if base.unchanged_in(&live, &key) {
                pattern
            } else {
                let mut current = QueryPattern::clone(&patterns[&key]);
                current.success_rate = current.computed_success_rate();
                current
            };
            let fresh = Arc::new(fresh);
            patterns.insert(key, Arc::clone(&fresh));
            commit.recomputed.push(fresh);
        }

        commit.retained = patterns.len();
        if !commit.pruned.is_empty() || !commit.recomputed.is_empty() {
            persist(&commit)?;
            self.current.store(Arc::new(PatternSnapshot {
                patterns,
                version: live.version + 1,
            }));
        }
        Ok(commit)
    }
}
