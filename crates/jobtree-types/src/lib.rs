//! `jobtree-types` – shared vocabulary for the job tree.
//!
//! Everything a caller of `jobtree-kernel` needs to name: object ids, node
//! state, readiness signals, importance ranks, policy handles and the
//! [`JobError`] taxonomy.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Height granted to the root job.  Every child job has one less than its
/// parent, and a job at height zero cannot host children.
pub const ROOT_MAX_HEIGHT: u32 = 32;

/// Name given to the root job.
pub const ROOT_JOB_NAME: &str = "root";

/// Longest name a job can carry, in bytes.
pub const MAX_NAME_LEN: usize = 31;

/// Explicit importance ranks span `RANK_MIN..=RANK_MAX`.
pub type Rank = u32;

pub const RANK_MIN: Rank = 0;
pub const RANK_MAX: Rank = 255;

// ────────────────────────────────────────────────────────────────────────────
// Object ids
// ────────────────────────────────────────────────────────────────────────────

/// Process-unique identifier of a kernel object (job or process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Never handed out by [`ObjectId::allocate`].
    pub const INVALID: ObjectId = ObjectId(0);

    /// Hand out the next unused id.
    pub fn allocate() -> Self {
        // Ids below 1024 are reserved.
        static NEXT: AtomicU64 = AtomicU64::new(1024);
        ObjectId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        ObjectId(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Node state
// ────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Accepting children.  A job returns here once a cascade has reaped
    /// every child.
    Ready,
    /// A termination cascade is in flight; no children may be added.
    Killing,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Ready => write!(f, "ready"),
            JobState::Killing => write!(f, "killing"),
        }
    }
}

/// Readiness bits that external waiters observe on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalState {
    /// The job has no child jobs.
    pub no_jobs: bool,
    /// The job has no child processes.
    pub no_processes: bool,
}

impl SignalState {
    /// Derive the bits from the current child counts.
    pub fn from_counts(jobs: usize, processes: usize) -> Self {
        Self {
            no_jobs: jobs == 0,
            no_processes: processes == 0,
        }
    }

    /// Both bits are asserted.
    pub fn is_empty(&self) -> bool {
        self.no_jobs && self.no_processes
    }
}

impl Default for SignalState {
    fn default() -> Self {
        Self::from_counts(0, 0)
    }
}

/// Creation-time options for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFlags {
    /// The job may be chosen by the out-of-memory killer.
    #[serde(default)]
    pub kill_on_oom: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Importance
// ────────────────────────────────────────────────────────────────────────────

/// A job's own importance setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    /// Use the rank of the nearest ancestor with an explicit rank.
    Inherited,
    /// An explicit rank in `RANK_MIN..=RANK_MAX`.
    Explicit(Rank),
}

impl Importance {
    /// Reject explicit ranks outside `RANK_MIN..=RANK_MAX`.
    pub fn validate(self) -> Result<Self, JobError> {
        match self {
            Importance::Explicit(rank) if !(RANK_MIN..=RANK_MAX).contains(&rank) => {
                Err(JobError::OutOfRange(format!(
                    "importance {rank} outside {RANK_MIN}..={RANK_MAX}"
                )))
            }
            other => Ok(other),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Policy
// ────────────────────────────────────────────────────────────────────────────

/// Opaque policy value produced by a policy merger.  The tree only stores
/// and propagates it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyHandle(u64);

impl PolicyHandle {
    /// The policy of the root job: nothing set.
    pub const EMPTY: PolicyHandle = PolicyHandle(0);

    pub const fn from_bits(bits: u64) -> Self {
        PolicyHandle(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }
}

/// How new rules combine with the ones a job already carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Conflicting rules are ignored; existing entries win.
    Relative,
    /// Any conflicting rule fails the whole request.
    Absolute,
}

/// What happens when a policy condition triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    Allow,
    Deny,
    AllowException,
    DenyException,
    Kill,
}

/// A single policy rule handed to the policy merger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub condition: u32,
    pub action: PolicyAction,
}

// ────────────────────────────────────────────────────────────────────────────
// Snapshot
// ────────────────────────────────────────────────────────────────────────────

/// Point-in-time view of a single job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: ObjectId,
    pub parent: Option<ObjectId>,
    pub name: String,
    pub state: JobState,
    pub max_height: u32,
    pub job_count: usize,
    pub process_count: usize,
    pub signals: SignalState,
    /// The job's own setting.
    pub importance: Importance,
    /// The rank after resolving inheritance.
    pub effective_importance: Rank,
    pub kill_on_oom: bool,
    pub has_exception_port: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Recoverable failures reported by job tree operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Height exhausted or a rank out of bounds.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// The operation is not valid for the job's current state.
    #[error("Bad state: {0}")]
    BadState(String),

    #[error("Out of memory")]
    NoMemory,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_ids_are_unique_and_valid() {
        let a = ObjectId::allocate();
        let b = ObjectId::allocate();
        assert_ne!(a, b);
        assert_ne!(a, ObjectId::INVALID);
        assert!(a.raw() >= 1024);
    }

    #[test]
    fn signal_bits_follow_counts() {
        assert!(SignalState::from_counts(0, 0).is_empty());

        let s = SignalState::from_counts(1, 0);
        assert!(!s.no_jobs);
        assert!(s.no_processes);

        let s = SignalState::from_counts(0, 3);
        assert!(s.no_jobs);
        assert!(!s.no_processes);
        assert!(!s.is_empty());
    }

    #[test]
    fn importance_range_is_enforced() {
        assert!(Importance::Inherited.validate().is_ok());
        assert!(Importance::Explicit(RANK_MIN).validate().is_ok());
        assert!(Importance::Explicit(RANK_MAX).validate().is_ok());
        assert!(matches!(
            Importance::Explicit(RANK_MAX + 1).validate(),
            Err(JobError::OutOfRange(_))
        ));
    }

    #[test]
    fn job_error_display() {
        let err = JobError::BadState("job 1030 is killing".to_string());
        assert!(err.to_string().contains("Bad state"));
        assert!(err.to_string().contains("1030"));
        assert_eq!(JobError::NoMemory.to_string(), "Out of memory");
    }

    #[test]
    fn job_info_serializes_with_lowercase_enums() {
        let info = JobInfo {
            id: ObjectId::from_raw(2048),
            parent: Some(ObjectId::from_raw(1024)),
            name: "svc".to_string(),
            state: JobState::Killing,
            max_height: 31,
            job_count: 0,
            process_count: 2,
            signals: SignalState::from_counts(0, 2),
            importance: Importance::Inherited,
            effective_importance: RANK_MAX,
            kill_on_oom: true,
            has_exception_port: false,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["id"], 2048);
        assert_eq!(json["state"], "killing");
        assert_eq!(json["importance"], "inherited");
        assert_eq!(json["signals"]["no_jobs"], true);
    }
}
