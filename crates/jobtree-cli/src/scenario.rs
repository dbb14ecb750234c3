//! Scenario files – a TOML description of a job tree to build.
//!
//! ```toml
//! kill = ["apps"]
//! oom_kills = 1
//!
//! [[job]]
//! name = "system"
//! importance = 200
//! processes = 2
//! policy = [{ condition = 1, action = "deny" }]
//!
//! [[job]]
//! name = "apps"
//! parent = "system"
//! importance = "inherited"
//! kill_on_oom = true
//! processes = 3
//! ```
//!
//! Jobs are created in file order, so a parent must appear before its
//! children.  `parent` defaults to `"root"`.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;
use tracing::{debug, trace};

use jobtree_kernel::{ExceptionPort, Job, JobTree, ProcessNode};
use jobtree_types::{
    Importance, JobFlags, JobInfo, JobState, ObjectId, PolicyMode, PolicyRule, ROOT_JOB_NAME,
};

/// Scenario used when neither the command line nor the config names one.
pub const DEMO_SCENARIO: &str = r#"
kill = ["browser"]
oom_kills = 1

[[job]]
name = "system"
importance = 220
processes = 2
policy = [{ condition = 0, action = "deny" }]

[[job]]
name = "drivers"
parent = "system"
processes = 3

[[job]]
name = "session"
importance = 120
processes = 1

[[job]]
name = "browser"
parent = "session"
kill_on_oom = true
processes = 4

[[job]]
name = "tabs"
parent = "browser"
processes = 2

[[job]]
name = "editor"
parent = "session"
kill_on_oom = true
importance = 90
processes = 1
"#;

// ─────────────────────────────────────────────────────────────────────────────
// File format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default, rename = "job")]
    pub jobs: Vec<JobSpec>,

    /// Jobs to kill, by name, after the tree is built.
    #[serde(default)]
    pub kill: Vec<String>,

    /// Number of out-of-memory kills to run after the named kills.
    #[serde(default)]
    pub oom_kills: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobSpec {
    pub name: String,

    #[serde(default = "default_parent")]
    pub parent: String,

    #[serde(default)]
    pub importance: Option<ImportanceSpec>,

    #[serde(default)]
    pub kill_on_oom: bool,

    #[serde(default)]
    pub processes: u32,

    #[serde(default)]
    pub policy: Vec<PolicyRule>,
}

/// `importance = 42` or `importance = "inherited"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ImportanceSpec {
    Rank(u32),
    Keyword(String),
}

impl ImportanceSpec {
    fn resolve(&self) -> Result<Importance, String> {
        match self {
            ImportanceSpec::Rank(rank) => Ok(Importance::Explicit(*rank)),
            ImportanceSpec::Keyword(k) if k == "inherited" => Ok(Importance::Inherited),
            ImportanceSpec::Keyword(k) => Err(format!("unknown importance '{k}'")),
        }
    }
}

fn default_parent() -> String {
    ROOT_JOB_NAME.to_string()
}

impl Scenario {
    pub fn parse(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| format!("Failed to parse scenario: {}", e))
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read scenario at {}: {}", path.display(), e))?;
        Self::parse(&raw)
    }

    pub fn demo() -> Self {
        Self::parse(DEMO_SCENARIO).unwrap_or_else(|e| panic!("built-in scenario is invalid: {e}"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Simulated process
// ─────────────────────────────────────────────────────────────────────────────

/// A process that exits the moment it is killed.
pub struct SimProcess {
    id: ObjectId,
    job: Arc<Job>,
    alive: AtomicBool,
}

impl SimProcess {
    fn spawn(job: &Arc<Job>) -> Result<Arc<SimProcess>, String> {
        let process = Arc::new(SimProcess {
            id: ObjectId::allocate(),
            job: Arc::clone(job),
            alive: AtomicBool::new(true),
        });
        let node: Arc<dyn ProcessNode> = process.clone();
        if !job.add_child_process(&node) {
            return Err(format!("job '{}' is not accepting processes", job.name()));
        }
        Ok(process)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

impl ProcessNode for SimProcess {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn kill(&self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            debug!(process = %self.id, job = %self.job.id(), "process exited");
            self.job.remove_child_process(self.id);
        }
    }

    fn on_exception_port_removal(&self, _port: &Arc<dyn ExceptionPort>) {
        trace!(process = %self.id, "exception port removed");
    }
}

impl Drop for SimProcess {
    fn drop(&mut self) {
        self.job.remove_child_process(self.id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// World
// ─────────────────────────────────────────────────────────────────────────────

/// A built scenario: the tree plus the handles that keep its jobs and
/// processes alive.
pub struct World {
    pub tree: JobTree,
    jobs: Vec<(String, Arc<Job>)>,
    processes: Vec<Arc<SimProcess>>,
}

impl World {
    /// Build every job of `scenario` under a fresh tree.
    pub fn build(scenario: &Scenario) -> Result<World, String> {
        let tree = JobTree::new();

        // The root must keep a descendant for as long as the process runs,
        // so the bootstrap job is never released.
        let bootstrap = Job::create(tree.root(), JobFlags::default())
            .map_err(|e| format!("Failed to create bootstrap job: {e}"))?;
        bootstrap.set_name("bootstrap");
        std::mem::forget(bootstrap);

        let mut world = World {
            tree,
            jobs: Vec::new(),
            processes: Vec::new(),
        };
        for spec in &scenario.jobs {
            world.add_job(spec)?;
        }
        Ok(world)
    }

    fn add_job(&mut self, spec: &JobSpec) -> Result<(), String> {
        if spec.name == ROOT_JOB_NAME || self.job(&spec.name).is_some() {
            return Err(format!("duplicate job name '{}'", spec.name));
        }
        let parent = if spec.parent == ROOT_JOB_NAME {
            Arc::clone(self.tree.root())
        } else {
            self.job(&spec.parent)
                .cloned()
                .ok_or_else(|| format!("job '{}': unknown parent '{}'", spec.name, spec.parent))?
        };

        let job = Job::create(
            &parent,
            JobFlags {
                kill_on_oom: spec.kill_on_oom,
            },
        )
        .map_err(|e| format!("job '{}': {e}", spec.name))?;
        job.set_name(&spec.name);

        if !spec.policy.is_empty() {
            job.set_policy(PolicyMode::Absolute, &spec.policy)
                .map_err(|e| format!("job '{}': {e}", spec.name))?;
        }
        if let Some(importance) = &spec.importance {
            job.set_importance(importance.resolve()?)
                .map_err(|e| format!("job '{}': {e}", spec.name))?;
        }
        for _ in 0..spec.processes {
            self.processes.push(SimProcess::spawn(&job)?);
        }

        debug!(job = %job.id(), name = %spec.name, processes = spec.processes, "scenario job built");
        self.jobs.push((spec.name.clone(), job));
        Ok(())
    }

    pub fn job(&self, name: &str) -> Option<&Arc<Job>> {
        self.jobs.iter().find(|(n, _)| n == name).map(|(_, job)| job)
    }

    /// Kill the job called `name`.
    pub fn kill(&self, name: &str) -> Result<(), String> {
        let job = if name == ROOT_JOB_NAME {
            self.tree.root()
        } else {
            self.job(name).ok_or_else(|| format!("unknown job '{name}'"))?
        };
        job.kill();
        Ok(())
    }

    /// Release the handles of jobs emptied by a cascade that is still
    /// waiting on them, letting those cascades finish.
    pub fn reap(&mut self) {
        self.processes.retain(|p| p.is_alive());
        loop {
            let (doomed, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.jobs)
                .into_iter()
                .partition(|(_, job)| is_reapable(job));
            self.jobs = keep;
            if doomed.is_empty() {
                break;
            }
            for (name, job) in doomed {
                debug!(job = %job.id(), %name, "reaped");
            }
        }
    }

    /// Info for every scenario job, in creation order.
    pub fn infos(&self) -> Vec<JobInfo> {
        self.jobs.iter().map(|(_, job)| job.info()).collect()
    }

    pub fn live_processes(&self) -> usize {
        self.processes.iter().filter(|p| p.is_alive()).count()
    }
}

/// An empty job whose parent is still killing: the parent's cascade only
/// completes once this handle goes away.
fn is_reapable(job: &Arc<Job>) -> bool {
    job.parent().is_some_and(|p| p.state() == JobState::Killing)
        && job.job_count() == 0
        && job.process_count() == 0
}
