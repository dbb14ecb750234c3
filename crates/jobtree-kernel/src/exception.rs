//! Exception port binding.
//!
//! A job holds at most one [`ExceptionPort`].  The tree owns only the
//! binding; delivering exceptions through the port happens elsewhere.
//!
//! Unbinding clears the slot and notifies the port **before** the job's lock
//! is released.  Anyone who later takes the lock and finds the slot empty can
//! rely on the port already having been told, so an explicit reset racing
//! with the port's own teardown cannot both believe they unbound it.

use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::debug;

use jobtree_types::JobError;

use crate::enumerate::JobEnumerator;
use crate::job::Job;
use crate::process::ProcessNode;

/// A port that receives exceptions for the jobs it is bound to.
pub trait ExceptionPort: Send + Sync {
    /// The port was unbound from its job.  Called with the job's lock held;
    /// must not call back into the job.
    fn on_target_unbind(&self);
}

impl Job {
    /// Bind `port` to this job.
    ///
    /// # Errors
    ///
    /// [`JobError::BadState`] when a port is already bound.
    pub fn set_exception_port(&self, port: Arc<dyn ExceptionPort>) -> Result<(), JobError> {
        let mut inner = self.inner.lock();
        if inner.exception_port.is_some() {
            return Err(JobError::BadState(format!(
                "job {} already has an exception port",
                self.id()
            )));
        }
        inner.exception_port = Some(port);
        debug!(job = %self.id(), "exception port bound");
        Ok(())
    }

    /// Unbind the current port, if any, and return whether one was bound.
    ///
    /// Unless `quietly` is set, every process below this job is told the
    /// port went away.
    pub fn reset_exception_port(&self, quietly: bool) -> bool {
        let port = {
            let mut inner = self.inner.lock();
            let Some(port) = inner.exception_port.take() else {
                return false;
            };
            port.on_target_unbind();
            port
        };
        debug!(job = %self.id(), quietly, "exception port unbound");

        if !quietly {
            let mut notifier = RemovalNotifier { port: &port };
            let completed = self.enumerate_children(&mut notifier, true);
            assert!(
                completed,
                "exception port removal walk under job {} was cut short",
                self.id()
            );
        }
        true
    }

    /// The currently bound port.
    pub fn exception_port(&self) -> Option<Arc<dyn ExceptionPort>> {
        self.inner.lock().exception_port.clone()
    }
}

struct RemovalNotifier<'a> {
    port: &'a Arc<dyn ExceptionPort>,
}

impl JobEnumerator for RemovalNotifier<'_> {
    fn on_process(&mut self, process: &Arc<dyn ProcessNode>) -> ControlFlow<()> {
        process.on_exception_port_removal(self.port);
        ControlFlow::Continue(())
    }
}
