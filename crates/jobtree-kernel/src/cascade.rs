//! Termination cascade.
//!
//! [`Job::kill`] walks the subtree with an explicit worklist instead of
//! recursion.  Each visited job is switched from [`JobState::Ready`] to
//! [`JobState::Killing`] under its own lock, and in the same critical
//! section every child link is upgraded.  Links whose target is already
//! being destroyed fail to upgrade and are skipped; that child is about to
//! unlink itself anyway.
//!
//! Once every reachable job is marked, the collected processes are killed,
//! deepest batches first.  Nothing waits for them: as each child goes away
//! it unlinks from its parent, and a parent whose last child leaves flips
//! back to [`JobState::Ready`].

use std::sync::Arc;

use tracing::{info, instrument, trace};

use jobtree_types::JobState;

use crate::job::{ChildLink, Job};
use crate::process::ProcessNode;

/// Children captured when a job enters [`JobState::Killing`].
struct Victims {
    jobs: Vec<Arc<Job>>,
    processes: Vec<Arc<dyn ProcessNode>>,
}

impl Job {
    /// Start terminating this job and everything below it.
    ///
    /// A job that is already killing, or has no children, is left alone; a
    /// second concurrent call on the same job therefore starts nothing.
    /// Returning does not mean the subtree is gone, only that termination
    /// was started for every descendant alive at the time of the call.
    #[instrument(skip(self), fields(job = %self.id()))]
    pub fn kill(&self) {
        let Some(first) = self.begin_kill() else {
            return;
        };
        info!(
            jobs = first.jobs.len(),
            processes = first.processes.len(),
            "kill cascade started"
        );

        let mut batches = vec![first.processes];
        let mut pending = first.jobs;
        while let Some(job) = pending.pop() {
            if let Some(victims) = job.begin_kill() {
                pending.extend(victims.jobs);
                batches.push(victims.processes);
            }
        }

        for process in batches.iter().rev().flatten() {
            process.kill();
        }
    }

    /// Enter [`JobState::Killing`] and capture strong references to every
    /// child that is still alive.  `None` when there is nothing to start.
    fn begin_kill(&self) -> Option<Victims> {
        let mut inner = self.inner.lock();
        if inner.state != JobState::Ready {
            trace!(job = %self.id(), "cascade already in flight");
            return None;
        }
        if inner.is_empty() {
            return None;
        }
        inner.state = JobState::Killing;

        let victims = Victims {
            jobs: inner.jobs.iter().filter_map(ChildLink::upgrade).collect(),
            processes: inner
                .processes
                .iter()
                .filter_map(ChildLink::upgrade)
                .collect(),
        };
        // The captured references may be the last ones; let them go only
        // after the lock is released.
        drop(inner);
        Some(victims)
    }
}
