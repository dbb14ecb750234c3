//! Text rendering of a job tree.

use std::ops::ControlFlow;
use std::sync::Arc;

use colored::Colorize;

use jobtree_kernel::{Job, JobEnumerator, JobTree, ProcessNode};
use jobtree_types::{JobState, SignalState};

/// Collects a job's direct child jobs.
#[derive(Default)]
struct ChildJobs {
    jobs: Vec<Arc<Job>>,
}

impl JobEnumerator for ChildJobs {
    fn on_job(&mut self, job: &Arc<Job>) -> ControlFlow<()> {
        self.jobs.push(Arc::clone(job));
        ControlFlow::Continue(())
    }
}

/// Counts processes across a whole subtree.
#[derive(Default)]
struct ProcessCounter {
    count: usize,
}

impl JobEnumerator for ProcessCounter {
    fn on_process(&mut self, _process: &Arc<dyn ProcessNode>) -> ControlFlow<()> {
        self.count += 1;
        ControlFlow::Continue(())
    }
}

/// One line per job, depth first from the root, children in creation order.
pub fn render_tree(tree: &JobTree, show_importance: bool) -> Vec<String> {
    let mut lines = Vec::new();
    let mut stack = vec![(Arc::clone(tree.root()), 0usize)];

    while let Some((job, depth)) = stack.pop() {
        lines.push(render_job(&job, depth, show_importance));

        let mut children = ChildJobs::default();
        job.enumerate_children(&mut children, false);
        stack.extend(children.jobs.into_iter().rev().map(|child| (child, depth + 1)));
    }
    lines
}

fn render_job(job: &Arc<Job>, depth: usize, show_importance: bool) -> String {
    let state = match job.state() {
        JobState::Ready => "ready".green(),
        JobState::Killing => "killing".red().bold(),
    };
    let mut line = format!(
        "{}{} {} [{}] jobs={} procs={} {}",
        "  ".repeat(depth),
        job.name().bold(),
        format!("#{}", job.id()).dimmed(),
        state,
        job.job_count(),
        job.process_count(),
        signal_marks(job.signals()),
    );
    if show_importance {
        line.push_str(&format!(
            " importance={} rank={}",
            job.importance(),
            job.importance_position()
        ));
    }
    if job.flags().kill_on_oom {
        line.push_str(&format!(" {}", "oom".yellow()));
    }
    line
}

fn signal_marks(signals: SignalState) -> String {
    let mut marks = Vec::new();
    if signals.no_jobs {
        marks.push("no-jobs");
    }
    if signals.no_processes {
        marks.push("no-procs");
    }
    if marks.is_empty() {
        "busy".to_string()
    } else {
        marks.join(",")
    }
}

/// Total processes anywhere in the tree.
pub fn process_total(tree: &JobTree) -> usize {
    let mut counter = ProcessCounter::default();
    tree.root().enumerate_children(&mut counter, true);
    counter.count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{Scenario, World};

    #[test]
    fn renders_every_job_depth_first() {
        let world = World::build(&Scenario::demo()).expect("build");
        let lines = render_tree(&world.tree, true);

        // root, bootstrap, six scenario jobs
        assert_eq!(lines.len(), 8);
        assert!(lines[0].contains("root"));
        assert!(lines[0].contains("importance=255"));

        let tabs = lines.iter().position(|l| l.contains("tabs")).unwrap();
        let browser = lines.iter().position(|l| l.contains("browser")).unwrap();
        assert_eq!(tabs, browser + 1);
        assert!(lines[tabs].starts_with("      "));
        assert!(lines[browser].contains("oom"));
    }

    #[test]
    fn importance_can_be_hidden() {
        let world = World::build(&Scenario::demo()).expect("build");
        assert!(render_tree(&world.tree, false).iter().all(|l| !l.contains("importance=")));
    }

    #[test]
    fn killed_jobs_show_their_state() {
        let world = World::build(&Scenario::demo()).expect("build");
        world.kill("browser").unwrap();

        let lines = render_tree(&world.tree, false);
        let browser = lines.iter().find(|l| l.contains("browser")).unwrap();
        assert!(browser.contains("killing"));
        assert!(browser.contains("no-procs"));
    }

    #[test]
    fn process_total_counts_the_whole_tree() {
        let world = World::build(&Scenario::demo()).expect("build");
        assert_eq!(process_total(&world.tree), 13);

        world.kill("session").unwrap();
        // session, browser, tabs and editor lose 8 processes
        assert_eq!(process_total(&world.tree), 5);
    }

    #[test]
    fn signal_marks_describe_empty_sides() {
        assert_eq!(signal_marks(SignalState::default()), "no-jobs,no-procs");
        assert_eq!(signal_marks(SignalState::from_counts(1, 1)), "busy");
        assert_eq!(signal_marks(SignalState::from_counts(1, 0)), "no-procs");
    }
}
