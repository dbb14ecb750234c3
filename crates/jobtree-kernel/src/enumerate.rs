//! [`JobEnumerator`] – visiting the children of a job.
//!
//! For each job the child links are copied under its lock, then visited
//! with the lock released: processes first, then jobs.  A link is upgraded
//! only for the visitor call (and, for a job, while its own links are
//! copied), so a visitor never keeps a child alive and may freely call back
//! into the tree.  Children destroyed
//! between the copy and the visit are skipped.
//!
//! Recursion into child jobs uses an explicit stack; depth is bounded by the
//! root's height in any case.

use std::ops::ControlFlow;
use std::sync::Arc;

use crate::job::{ChildLink, Job};
use crate::process::ProcessNode;

/// Callbacks for [`Job::enumerate_children`].  Return
/// [`ControlFlow::Break`] to stop the walk.
pub trait JobEnumerator {
    fn on_process(&mut self, _process: &Arc<dyn ProcessNode>) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }

    fn on_job(&mut self, _job: &Arc<Job>) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

impl Job {
    /// Visit every child process, then every child job.  With `recurse`,
    /// each child job's own children are visited right after it.
    ///
    /// Returns `false` when the visitor stopped the walk.
    pub fn enumerate_children(&self, visitor: &mut dyn JobEnumerator, recurse: bool) -> bool {
        let (processes, jobs) = self.child_links();
        if visit_processes(visitor, &processes).is_break() {
            return false;
        }
        let mut frames = vec![jobs.into_iter()];

        while let Some(frame) = frames.last_mut() {
            let Some(link) = frame.next() else {
                frames.pop();
                continue;
            };
            let Some(job) = link.upgrade() else {
                continue;
            };
            if visitor.on_job(&job).is_break() {
                return false;
            }
            if !recurse {
                continue;
            }
            let (processes, jobs) = job.child_links();
            drop(job);
            if visit_processes(visitor, &processes).is_break() {
                return false;
            }
            frames.push(jobs.into_iter());
        }
        true
    }

    /// Copy of this job's child links, taken under its lock.
    fn child_links(&self) -> (Vec<ChildLink<dyn ProcessNode>>, Vec<ChildLink<Job>>) {
        let inner = self.inner.lock();
        (inner.processes.clone(), inner.jobs.clone())
    }
}

fn visit_processes(
    visitor: &mut dyn JobEnumerator,
    processes: &[ChildLink<dyn ProcessNode>],
) -> ControlFlow<()> {
    for link in processes {
        if let Some(process) = link.upgrade() {
            visitor.on_process(&process)?;
        }
    }
    ControlFlow::Continue(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeProcess, tree};
    use jobtree_types::{JobFlags, ObjectId};

    #[derive(Default)]
    struct Recorder {
        seen: Vec<(char, ObjectId)>,
        stop_on_process: bool,
        stop_on_job: Option<ObjectId>,
    }

    impl JobEnumerator for Recorder {
        fn on_process(&mut self, process: &Arc<dyn ProcessNode>) -> ControlFlow<()> {
            self.seen.push(('p', process.id()));
            if self.stop_on_process {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        }

        fn on_job(&mut self, job: &Arc<Job>) -> ControlFlow<()> {
            self.seen.push(('j', job.id()));
            if self.stop_on_job == Some(job.id()) {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        }
    }

    #[test]
    fn visits_processes_before_jobs() {
        let tree = tree();
        let job = Job::create(tree.root(), JobFlags::default()).unwrap();
        let child = Job::create(&job, JobFlags::default()).unwrap();
        let process = FakeProcess::spawn(&job);

        let mut rec = Recorder::default();
        assert!(job.enumerate_children(&mut rec, false));
        assert_eq!(rec.seen, vec![('p', process.id()), ('j', child.id())]);
    }

    #[test]
    fn recursion_visits_each_subtree_after_its_job() {
        let tree = tree();
        let top = Job::create(tree.root(), JobFlags::default()).unwrap();
        let a = Job::create(&top, JobFlags::default()).unwrap();
        let b = Job::create(&top, JobFlags::default()).unwrap();
        let a1 = Job::create(&a, JobFlags::default()).unwrap();
        let pa = FakeProcess::spawn(&a);
        let pb = FakeProcess::spawn(&b);

        let mut flat = Recorder::default();
        assert!(top.enumerate_children(&mut flat, false));
        assert_eq!(flat.seen, vec![('j', a.id()), ('j', b.id())]);

        let mut deep = Recorder::default();
        assert!(top.enumerate_children(&mut deep, true));
        assert_eq!(
            deep.seen,
            vec![
                ('j', a.id()),
                ('p', pa.id()),
                ('j', a1.id()),
                ('j', b.id()),
                ('p', pb.id()),
            ]
        );
    }

    #[test]
    fn stop_on_first_process_skips_jobs() {
        let tree = tree();
        let job = Job::create(tree.root(), JobFlags::default()).unwrap();
        let _child = Job::create(&job, JobFlags::default()).unwrap();
        let first = FakeProcess::spawn(&job);
        let _second = FakeProcess::spawn(&job);

        for recurse in [false, true] {
            let mut rec = Recorder {
                stop_on_process: true,
                ..Recorder::default()
            };
            assert!(!job.enumerate_children(&mut rec, recurse));
            assert_eq!(rec.seen, vec![('p', first.id())]);
        }
    }

    #[test]
    fn stop_on_job_halts_recursive_walk() {
        let tree = tree();
        let top = Job::create(tree.root(), JobFlags::default()).unwrap();
        let a = Job::create(&top, JobFlags::default()).unwrap();
        let _b = Job::create(&top, JobFlags::default()).unwrap();
        let _pa = FakeProcess::spawn(&a);

        let mut rec = Recorder {
            stop_on_job: Some(a.id()),
            ..Recorder::default()
        };
        assert!(!top.enumerate_children(&mut rec, true));
        assert_eq!(rec.seen, vec![('j', a.id())]);
    }

    #[test]
    fn visitor_may_call_back_into_the_tree() {
        struct Killer;
        impl JobEnumerator for Killer {
            fn on_job(&mut self, job: &Arc<Job>) -> ControlFlow<()> {
                job.kill();
                assert!(job.parent().is_some_and(|p| p.job_count() > 0));
                ControlFlow::Continue(())
            }
        }

        let tree = tree();
        let top = Job::create(tree.root(), JobFlags::default()).unwrap();
        let a = Job::create(&top, JobFlags::default()).unwrap();
        let pa = FakeProcess::spawn(&a);

        assert!(top.enumerate_children(&mut Killer, true));
        assert_eq!(pa.kill_count(), 1);
        assert!(a.signals().is_empty());
    }

    #[test]
    fn child_job_is_released_before_its_processes_are_visited() {
        struct HandleCounter {
            job: Arc<Job>,
            expected: usize,
            checked: usize,
        }
        impl JobEnumerator for HandleCounter {
            fn on_process(&mut self, _process: &Arc<dyn ProcessNode>) -> ControlFlow<()> {
                assert_eq!(Arc::strong_count(&self.job), self.expected);
                self.checked += 1;
                ControlFlow::Continue(())
            }
        }

        let tree = tree();
        let top = Job::create(tree.root(), JobFlags::default()).unwrap();
        let a = Job::create(&top, JobFlags::default()).unwrap();
        let _pa = FakeProcess::spawn(&a);

        let mut counter = HandleCounter {
            job: Arc::clone(&a),
            expected: 0,
            checked: 0,
        };
        counter.expected = Arc::strong_count(&a);
        assert!(top.enumerate_children(&mut counter, true));
        assert_eq!(counter.checked, 1);
    }
}
