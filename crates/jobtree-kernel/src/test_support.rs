//! Test doubles shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use jobtree_types::{JobError, JobFlags, ObjectId};

use crate::exception::ExceptionPort;
use crate::job::Job;
use crate::process::ProcessNode;
use crate::tree::JobTree;

/// A tree whose root can never run out of descendants: one job is created
/// and leaked, the way a bootstrap job lives for the whole system.
pub(crate) fn tree() -> JobTree {
    let tree = JobTree::new();
    let bootstrap = Job::create(tree.root(), JobFlags::default()).expect("bootstrap job");
    std::mem::forget(bootstrap);
    tree
}

/// A process that dies as soon as it is killed.  It unlinks itself from
/// its job and lets go of the job on death, or on drop if it never died.
pub(crate) struct FakeProcess {
    id: ObjectId,
    /// `None` once the process is dead.
    job: Mutex<Option<Arc<Job>>>,
    kills: AtomicUsize,
    port_removals: AtomicUsize,
}

impl FakeProcess {
    pub(crate) fn spawn(job: &Arc<Job>) -> Arc<FakeProcess> {
        Self::try_spawn(job).expect("job accepts processes")
    }

    pub(crate) fn try_spawn(job: &Arc<Job>) -> Result<Arc<FakeProcess>, JobError> {
        let process = Arc::new(FakeProcess {
            id: ObjectId::allocate(),
            job: Mutex::new(Some(Arc::clone(job))),
            kills: AtomicUsize::new(0),
            port_removals: AtomicUsize::new(0),
        });
        let node: Arc<dyn ProcessNode> = process.clone();
        if job.add_child_process(&node) {
            Ok(process)
        } else {
            Err(JobError::BadState(format!("job {} refused the process", job.id())))
        }
    }

    pub(crate) fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub(crate) fn port_removals(&self) -> usize {
        self.port_removals.load(Ordering::SeqCst)
    }
}

impl ProcessNode for FakeProcess {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn kill(&self) {
        self.kills.fetch_add(1, Ordering::SeqCst);
        let job = self.job.lock().take();
        if let Some(job) = job {
            job.remove_child_process(self.id);
        }
    }

    fn on_exception_port_removal(&self, _port: &Arc<dyn ExceptionPort>) {
        self.port_removals.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for FakeProcess {
    fn drop(&mut self) {
        if let Some(job) = self.job.get_mut().take() {
            job.remove_child_process(self.id);
        }
    }
}
