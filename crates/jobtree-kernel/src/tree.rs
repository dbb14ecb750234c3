//! [`JobTree`] – the root job and the state shared by every job under it.

use std::sync::Arc;

use tracing::info;

use jobtree_types::{JobState, ObjectId};

use crate::importance::ImportanceList;
use crate::job::Job;
use crate::policy::{BasicPolicyMerger, PolicyMerger};

/// State every job in a tree points at.
pub(crate) struct Shared {
    pub(crate) importance: ImportanceList,
    pub(crate) policy_merger: Box<dyn PolicyMerger>,
}

/// A job tree: owns the root job and the tree-wide importance list.
///
/// The importance list is populated with the root before any other job can
/// exist, and every job removes its own entry when it is destroyed.
///
/// The root must always keep at least one live descendant once it has had
/// one; losing the last is treated as a fatal bug and panics.
///
/// # Example
///
/// ```
/// use jobtree_kernel::{Job, JobTree};
/// use jobtree_types::{JobFlags, JobState};
///
/// let tree = JobTree::new();
/// let session = Job::create(tree.root(), JobFlags::default()).unwrap();
/// let app = Job::create(&session, JobFlags::default()).unwrap();
///
/// session.kill();
/// assert_eq!(session.state(), JobState::Killing);
///
/// // The cascade finishes as handles to the children are released.
/// drop(app);
/// assert_eq!(session.state(), JobState::Ready);
/// # std::mem::forget(session);
/// ```
pub struct JobTree {
    root: Arc<Job>,
}

impl JobTree {
    /// Create a tree whose policies are merged by [`BasicPolicyMerger`].
    pub fn new() -> Self {
        Self::with_policy_merger(Box::new(BasicPolicyMerger))
    }

    /// Create a tree with a custom policy merger.
    pub fn with_policy_merger(policy_merger: Box<dyn PolicyMerger>) -> Self {
        let shared = Arc::new(Shared {
            importance: ImportanceList::new(),
            policy_merger,
        });
        Self {
            root: Job::create_root(shared),
        }
    }

    pub fn root(&self) -> &Arc<Job> {
        &self.root
    }

    /// Number of live jobs in the tree, the root included.
    pub fn job_count(&self) -> usize {
        self.root.shared.importance.len()
    }

    /// Every live job, least important first.
    pub fn jobs_by_importance(&self) -> Vec<Arc<Job>> {
        self.root.shared.importance.snapshot()
    }

    /// Kill the least important job that opted into out-of-memory kills
    /// and has something to kill.  Returns its id, or `None` when there is
    /// no such job.
    pub fn kill_least_important(&self) -> Option<ObjectId> {
        let candidates = self.jobs_by_importance();
        let victim = candidates.iter().find(|job| {
            !job.is_root()
                && job.flags().kill_on_oom
                && job.state() == JobState::Ready
                && (job.job_count() > 0 || job.process_count() > 0)
        })?;
        info!(job = %victim.id(), name = %victim.name(), "killing least important job");
        victim.kill();
        Some(victim.id())
    }
}

impl Default for JobTree {
    fn default() -> Self {
        Self::new()
    }
}
