//! [`ProcessNode`] – the surface a process exposes to its job.
//!
//! Processes live outside this crate.  A job only keeps a non-owning link
//! to each of its processes, so every implementation must honour one
//! contract: before the process is freed (from its `Drop`, or earlier when
//! it dies) it calls [`Job::remove_child_process`] on the job it joined.
//! That call takes the job's lock, which is what keeps a concurrent
//! [`Job::kill`] from upgrading a link to a process that is already being
//! torn down.
//!
//! [`Job::remove_child_process`]: crate::job::Job::remove_child_process
//! [`Job::kill`]: crate::job::Job::kill

use std::sync::Arc;

use jobtree_types::ObjectId;

use crate::exception::ExceptionPort;

/// A process as seen by the job tree.
pub trait ProcessNode: Send + Sync {
    /// Stable id of the process.
    fn id(&self) -> ObjectId;

    /// Begin terminating the process.  Called with no job lock held.
    fn kill(&self);

    /// The exception port of an enclosing job was unbound.
    fn on_exception_port_removal(&self, port: &Arc<dyn ExceptionPort>);
}
