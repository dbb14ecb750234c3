//! [`Job`] – a node in the job tree.
//!
//! # Ownership
//!
//! A child job keeps its parent alive through a strong reference; the parent
//! only holds non-owning links ([`Weak`]) to its child jobs and processes.
//! Children are owned by whoever holds handles to them outside the tree.
//!
//! Every job guards its child links, state, policy, importance, name and
//! exception port with one lock.  A child that is being destroyed must take
//! its parent's lock to unlink itself (see the `Drop` impl below and the
//! [`ProcessNode`] contract), so while a parent holds its own lock no child
//! can finish destruction.  Upgrading a link under that lock therefore either
//! yields a live child or fails; it can never revive a freed one.
//!
//! # Lock order
//!
//! Job lock first, importance-list lock second.  A strong reference that was
//! produced by upgrading a link is never dropped while a job lock or the
//! importance-list lock is held, since dropping the last reference to a job
//! re-enters both.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, instrument, trace};

use jobtree_types::{
    Importance, JobError, JobFlags, JobInfo, JobState, MAX_NAME_LEN, ObjectId, PolicyHandle,
    PolicyMode, PolicyRule, RANK_MAX, ROOT_JOB_NAME, ROOT_MAX_HEIGHT, SignalState,
};

use crate::exception::ExceptionPort;
use crate::process::ProcessNode;
use crate::tree::Shared;

// ────────────────────────────────────────────────────────────────────────────
// Child links
// ────────────────────────────────────────────────────────────────────────────

/// Non-owning link from a job to one of its children.
pub(crate) struct ChildLink<T: ?Sized> {
    pub(crate) id: ObjectId,
    node: Weak<T>,
}

impl<T: ?Sized> ChildLink<T> {
    fn new(id: ObjectId, node: Weak<T>) -> Self {
        Self { id, node }
    }

    /// Upgrade-if-alive: a strong reference only if the child still has one.
    pub(crate) fn upgrade(&self) -> Option<Arc<T>> {
        self.node.upgrade()
    }
}

impl<T: ?Sized> Clone for ChildLink<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            node: Weak::clone(&self.node),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Lock-protected state
// ────────────────────────────────────────────────────────────────────────────

pub(crate) struct JobInner {
    pub(crate) state: JobState,
    pub(crate) name: String,
    pub(crate) jobs: Vec<ChildLink<Job>>,
    pub(crate) processes: Vec<ChildLink<dyn ProcessNode>>,
    pub(crate) signals: SignalState,
    pub(crate) policy: PolicyHandle,
    pub(crate) importance: Importance,
    pub(crate) exception_port: Option<Arc<dyn ExceptionPort>>,
}

impl JobInner {
    fn new(name: &str, policy: PolicyHandle, importance: Importance) -> Self {
        Self {
            state: JobState::Ready,
            name: truncate_name(name),
            jobs: Vec::new(),
            processes: Vec::new(),
            signals: SignalState::default(),
            policy,
            importance,
            exception_port: None,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.processes.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Job
// ────────────────────────────────────────────────────────────────────────────

/// A container of child jobs and child processes.
///
/// # Example
///
/// ```
/// use jobtree_kernel::{Job, JobTree};
/// use jobtree_types::{JobFlags, ROOT_MAX_HEIGHT};
///
/// let tree = JobTree::new();
/// let job = Job::create(tree.root(), JobFlags::default()).unwrap();
///
/// assert_eq!(job.max_height(), ROOT_MAX_HEIGHT - 1);
/// assert_eq!(tree.root().job_count(), 1);
/// assert!(!tree.root().signals().no_jobs);
/// # std::mem::forget(job); // the root must never lose its last descendant
/// ```
pub struct Job {
    id: ObjectId,
    parent: Option<Arc<Job>>,
    max_height: u32,
    flags: JobFlags,
    pub(crate) shared: Arc<Shared>,
    pub(crate) inner: Mutex<JobInner>,
    signal_changed: Condvar,
}

impl Job {
    /// Build the root job and place it at the most-important end of the
    /// ranking list.
    pub(crate) fn create_root(shared: Arc<Shared>) -> Arc<Job> {
        let root = Arc::new(Job {
            id: ObjectId::allocate(),
            parent: None,
            max_height: ROOT_MAX_HEIGHT,
            flags: JobFlags::default(),
            shared,
            inner: Mutex::new(JobInner::new(
                ROOT_JOB_NAME,
                PolicyHandle::EMPTY,
                Importance::Explicit(RANK_MAX),
            )),
            signal_changed: Condvar::new(),
        });
        root.shared.importance.push_most_important(&root);
        debug!(job = %root.id, "root job created");
        root
    }

    /// Create a child of `parent`.  The child inherits the parent's policy,
    /// starts with [`Importance::Inherited`] and is ranked just below its
    /// newest sibling (or below `parent` when it has none).
    ///
    /// # Errors
    ///
    /// - [`JobError::OutOfRange`] – `parent` is at height zero.
    /// - [`JobError::BadState`] – `parent` is not [`JobState::Ready`].
    pub fn create(parent: &Arc<Job>, flags: JobFlags) -> Result<Arc<Job>, JobError> {
        if parent.max_height == 0 {
            return Err(JobError::OutOfRange(format!(
                "job {} is at height 0 and cannot have children",
                parent.id
            )));
        }

        let job = Arc::new(Job {
            id: ObjectId::allocate(),
            parent: Some(Arc::clone(parent)),
            max_height: parent.max_height - 1,
            flags,
            shared: Arc::clone(&parent.shared),
            inner: Mutex::new(JobInner::new("", parent.policy(), Importance::Inherited)),
            signal_changed: Condvar::new(),
        });

        if !parent.add_child_job(&job) {
            // Dropping `job` here unlinks nothing: it was never linked.
            return Err(JobError::BadState(format!(
                "job {} is not accepting children",
                parent.id
            )));
        }

        debug!(job = %job.id, parent = %parent.id, height = job.max_height, "job created");
        Ok(job)
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The parent job; `None` only for the root.
    pub fn parent(&self) -> Option<&Arc<Job>> {
        self.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn max_height(&self) -> u32 {
        self.max_height
    }

    pub fn flags(&self) -> JobFlags {
        self.flags
    }

    pub fn state(&self) -> JobState {
        self.inner.lock().state
    }

    pub fn job_count(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub fn process_count(&self) -> usize {
        self.inner.lock().processes.len()
    }

    /// Current readiness bits.
    pub fn signals(&self) -> SignalState {
        self.inner.lock().signals
    }

    /// Block until `ready` accepts the readiness bits or `timeout` passes.
    ///
    /// Returns the bits that satisfied `ready`, or `None` on timeout.
    pub fn wait_signals(
        &self,
        timeout: Duration,
        mut ready: impl FnMut(&SignalState) -> bool,
    ) -> Option<SignalState> {
        // A timeout too large to represent is treated as no timeout.
        let deadline = Instant::now().checked_add(timeout);
        let mut inner = self.inner.lock();
        while !ready(&inner.signals) {
            match deadline {
                Some(deadline) => {
                    if self
                        .signal_changed
                        .wait_until(&mut inner, deadline)
                        .timed_out()
                    {
                        return ready(&inner.signals).then_some(inner.signals);
                    }
                }
                None => self.signal_changed.wait(&mut inner),
            }
        }
        Some(inner.signals)
    }

    // ── Membership ──────────────────────────────────────────────────────────

    /// Link a freshly built child job and rank it next to its newest
    /// sibling.  Returns `false` when this job is not accepting children.
    pub(crate) fn add_child_job(&self, job: &Arc<Job>) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != JobState::Ready {
            return false;
        }
        let neighbour = inner.jobs.last().map_or(self.id, |link| link.id);
        inner.jobs.push(ChildLink::new(job.id, Arc::downgrade(job)));
        self.update_signals_locked(&mut inner);
        self.shared.importance.insert_below(neighbour, job);
        true
    }

    /// Link `process` as a child of this job.
    ///
    /// Returns `false` when this job is not [`JobState::Ready`]; callers
    /// surface that as [`JobError::BadState`].
    pub fn add_child_process(&self, process: &Arc<dyn ProcessNode>) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != JobState::Ready {
            return false;
        }
        inner
            .processes
            .push(ChildLink::new(process.id(), Arc::downgrade(process)));
        self.update_signals_locked(&mut inner);
        true
    }

    pub(crate) fn remove_child_job(&self, id: ObjectId) {
        let mut inner = self.inner.lock();
        let Some(pos) = inner.jobs.iter().position(|link| link.id == id) else {
            return;
        };
        inner.jobs.remove(pos);
        self.update_signals_decrement_locked(&mut inner);
    }

    /// Unlink the process `id`.  A no-op when it is not linked, so both a
    /// dying process and its destructor may call it.
    ///
    /// # Panics
    ///
    /// When this is the root and the removal leaves it with no children.
    pub fn remove_child_process(&self, id: ObjectId) {
        let mut inner = self.inner.lock();
        let Some(pos) = inner.processes.iter().position(|link| link.id == id) else {
            return;
        };
        inner.processes.remove(pos);
        self.update_signals_decrement_locked(&mut inner);
    }

    fn update_signals_locked(&self, inner: &mut JobInner) {
        let signals = SignalState::from_counts(inner.jobs.len(), inner.processes.len());
        if signals != inner.signals {
            trace!(job = %self.id, ?signals, "signals changed");
            inner.signals = signals;
            self.signal_changed.notify_all();
        }
    }

    fn update_signals_decrement_locked(&self, inner: &mut JobInner) {
        self.update_signals_locked(inner);
        if !inner.is_empty() {
            return;
        }
        if inner.state == JobState::Killing {
            inner.state = JobState::Ready;
            debug!(job = %self.id, "all children reaped");
        }
        if self.parent.is_none() {
            panic!("root job {} has no live descendants left", self.id);
        }
    }

    // ── Lookup ──────────────────────────────────────────────────────────────

    /// Strong reference to the child process `id`, if it is linked and alive.
    pub fn lookup_process_by_id(&self, id: ObjectId) -> Option<Arc<dyn ProcessNode>> {
        let inner = self.inner.lock();
        let found = inner
            .processes
            .iter()
            .find(|link| link.id == id)
            .and_then(ChildLink::upgrade);
        drop(inner);
        found
    }

    /// Strong reference to the child job `id`, if it is linked and alive.
    pub fn lookup_job_by_id(&self, id: ObjectId) -> Option<Arc<Job>> {
        let inner = self.inner.lock();
        let found = inner
            .jobs
            .iter()
            .find(|link| link.id == id)
            .and_then(ChildLink::upgrade);
        drop(inner);
        found
    }

    // ── Policy ──────────────────────────────────────────────────────────────

    pub fn policy(&self) -> PolicyHandle {
        self.inner.lock().policy
    }

    /// Merge `rules` into this job's policy.
    ///
    /// # Errors
    ///
    /// - [`JobError::BadState`] – the job has children.
    /// - Whatever the installed policy merger reports.
    #[instrument(skip(self, rules), fields(job = %self.id, rules = rules.len()))]
    pub fn set_policy(&self, mode: PolicyMode, rules: &[PolicyRule]) -> Result<(), JobError> {
        let mut inner = self.inner.lock();
        if !inner.is_empty() {
            return Err(JobError::BadState(format!(
                "job {} has children; policy is fixed",
                self.id
            )));
        }
        let merged = self.shared.policy_merger.merge(inner.policy, mode, rules)?;
        inner.policy = merged;
        Ok(())
    }

    // ── Name ────────────────────────────────────────────────────────────────

    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    /// Rename the job.  Names longer than [`MAX_NAME_LEN`] bytes are cut at
    /// the last character boundary that fits.
    pub fn set_name(&self, name: &str) {
        let name = truncate_name(name);
        self.inner.lock().name = name;
    }

    // ── Info ────────────────────────────────────────────────────────────────

    /// Point-in-time snapshot of this job.
    pub fn info(&self) -> JobInfo {
        let effective_importance = self.importance();
        let inner = self.inner.lock();
        JobInfo {
            id: self.id,
            parent: self.parent.as_ref().map(|p| p.id),
            name: inner.name.clone(),
            state: inner.state,
            max_height: self.max_height,
            job_count: inner.jobs.len(),
            process_count: inner.processes.len(),
            signals: inner.signals,
            importance: inner.importance,
            effective_importance,
            kill_on_oom: self.flags.kill_on_oom,
            has_exception_port: inner.exception_port.is_some(),
        }
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        // Unlink from the parent before leaving the ranking list, so a
        // sibling being created under the parent's lock still finds us there.
        if let Some(parent) = &self.parent {
            parent.remove_child_job(self.id);
        }
        self.shared.importance.remove(self.id);
        trace!(job = %self.id, "job destroyed");
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("parent", &self.parent.as_ref().map(|p| p.id))
            .field("max_height", &self.max_height)
            .finish_non_exhaustive()
    }
}

fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_NAME_LEN {
        return name.to_string();
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}
