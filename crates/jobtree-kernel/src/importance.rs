//! Importance ranking.
//!
//! Two separate notions live here:
//!
//! - A job's **rank**: an explicit value in `RANK_MIN..=RANK_MAX`, or
//!   [`Importance::Inherited`], resolved by walking up to the nearest
//!   ancestor with an explicit rank.  The root's rank is fixed at
//!   `RANK_MAX`.
//! - The tree-wide [`ImportanceList`]: every live job in one total order,
//!   kept least important first.  The root sits at the most-important end.
//!   A new job is placed just below its newest sibling, or just below its
//!   parent when it has none, so older jobs nearer the root always rank at
//!   or above newer ones without any comparison function.
//!
//! The list has its own lock.  When a job lock is also needed it is taken
//! first.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use jobtree_types::{Importance, JobError, ObjectId, Rank};

use crate::job::Job;

// ────────────────────────────────────────────────────────────────────────────
// ImportanceList
// ────────────────────────────────────────────────────────────────────────────

struct Entry {
    id: ObjectId,
    job: Weak<Job>,
}

/// Total order over every live job in a tree, least important first.
pub(crate) struct ImportanceList {
    entries: Mutex<Vec<Entry>>,
}

impl ImportanceList {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn push_most_important(&self, job: &Arc<Job>) {
        let mut entries = self.entries.lock();
        assert_absent(&entries, job.id());
        entries.push(Entry {
            id: job.id(),
            job: Arc::downgrade(job),
        });
    }

    /// Place `job` immediately on the less-important side of `anchor`.
    pub(crate) fn insert_below(&self, anchor: ObjectId, job: &Arc<Job>) {
        let mut entries = self.entries.lock();
        assert_absent(&entries, job.id());
        let pos = index_of(&entries, anchor);
        entries.insert(
            pos,
            Entry {
                id: job.id(),
                job: Arc::downgrade(job),
            },
        );
    }

    /// Drop the entry for `id`.  Jobs that failed to link never got one.
    pub(crate) fn remove(&self, id: ObjectId) {
        let mut entries = self.entries.lock();
        if let Some(pos) = entries.iter().position(|e| e.id == id) {
            entries.remove(pos);
        }
    }

    /// Move `id` immediately above `other`, or to the least-important end.
    pub(crate) fn move_above(&self, id: ObjectId, other: Option<ObjectId>) {
        let mut entries = self.entries.lock();
        let pos = index_of(&entries, id);
        let entry = entries.remove(pos);
        let pos = match other {
            None => 0,
            Some(other) => index_of(&entries, other) + 1,
        };
        entries.insert(pos, entry);
    }

    pub(crate) fn position(&self, id: ObjectId) -> Option<usize> {
        self.entries.lock().iter().position(|e| e.id == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Live jobs, least important first.  Jobs already being destroyed are
    /// skipped.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Job>> {
        let entries = self.entries.lock();
        let jobs = entries.iter().filter_map(|e| e.job.upgrade()).collect();
        drop(entries);
        jobs
    }
}

fn index_of(entries: &[Entry], id: ObjectId) -> usize {
    match entries.iter().position(|e| e.id == id) {
        Some(pos) => pos,
        None => panic!("job {id} is missing from the importance list"),
    }
}

fn assert_absent(entries: &[Entry], id: ObjectId) {
    if entries.iter().any(|e| e.id == id) {
        panic!("job {id} is already in the importance list");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Job importance operations
// ────────────────────────────────────────────────────────────────────────────

impl Job {
    /// Effective rank: the job's own explicit rank, or the nearest explicit
    /// rank found walking towards the root.
    ///
    /// # Panics
    ///
    /// When no ancestor has an explicit rank; the root always has one.
    pub fn importance(&self) -> Rank {
        let mut job = self;
        loop {
            let own = job.inner.lock().importance;
            if let Importance::Explicit(rank) = own {
                return rank;
            }
            match job.parent() {
                Some(parent) => job = parent.as_ref(),
                None => panic!("root job {} has no explicit importance", job.id()),
            }
        }
    }

    /// The job's own setting, without resolving inheritance.
    pub fn explicit_importance(&self) -> Importance {
        self.inner.lock().importance
    }

    /// # Errors
    ///
    /// - [`JobError::OutOfRange`] – an explicit rank outside
    ///   `RANK_MIN..=RANK_MAX`.
    /// - [`JobError::AccessDenied`] – this is the root.
    pub fn set_importance(&self, importance: Importance) -> Result<(), JobError> {
        let importance = importance.validate()?;
        if self.is_root() {
            return Err(JobError::AccessDenied(
                "the root job's importance cannot change".to_string(),
            ));
        }
        self.inner.lock().importance = importance;
        Ok(())
    }

    /// Re-rank this job directly above `other` in the importance list, or
    /// make it the least important job when `other` is `None`.
    ///
    /// # Errors
    ///
    /// - [`JobError::AccessDenied`] – this job or `other` is the root.
    /// - [`JobError::InvalidArgs`] – `other` belongs to another tree.
    pub fn make_more_important_than(&self, other: Option<&Arc<Job>>) -> Result<(), JobError> {
        if self.is_root() {
            return Err(JobError::AccessDenied(
                "the root job's rank cannot change".to_string(),
            ));
        }
        if let Some(other) = other {
            if !Arc::ptr_eq(&self.shared, &other.shared) {
                return Err(JobError::InvalidArgs(format!(
                    "job {} belongs to a different tree",
                    other.id()
                )));
            }
            if other.is_root() {
                return Err(JobError::AccessDenied(
                    "no job can rank above the root job".to_string(),
                ));
            }
            if other.id() == self.id() {
                return Ok(());
            }
        }
        self.shared
            .importance
            .move_above(self.id(), other.map(|o| o.id()));
        debug!(job = %self.id(), above = ?other.map(|o| o.id()), "job re-ranked");
        Ok(())
    }

    /// Index in the tree-wide importance list; 0 is the least important.
    pub fn importance_position(&self) -> usize {
        match self.shared.importance.position(self.id()) {
            Some(pos) => pos,
            None => panic!("job {} is missing from the importance list", self.id()),
        }
    }
}
