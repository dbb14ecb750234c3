//! `jobtree` – builds a job tree from a scenario and walks it through kills.
//!
//! 1. Loads `~/.jobtree/config.toml` (defaults plus `JOBTREE_*` overrides
//!    when absent).
//! 2. Builds the scenario named on the command line, in the config, or the
//!    built-in demo.
//! 3. Renders the tree, runs the scenario's named kills and out-of-memory
//!    kills, releases the handles the cascades are waiting on and renders
//!    the tree again.
//!
//! ```text
//! jobtree [--json] [SCENARIO]
//! jobtree --init
//! ```

mod config;
mod render;
mod scenario;

use std::path::PathBuf;
use std::process::ExitCode;

use colored::Colorize;
use tracing::{info, warn};

use config::{Config, LogFormat};
use scenario::{Scenario, World};

struct Args {
    init: bool,
    json: bool,
    scenario: Option<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        init: false,
        json: false,
        scenario: None,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--init" => args.init = true,
            "--json" => args.json = true,
            flag if flag.starts_with("--") => return Err(format!("unknown flag '{flag}'")),
            path if args.scenario.is_none() => args.scenario = Some(PathBuf::from(path)),
            extra => return Err(format!("unexpected argument '{extra}'")),
        }
    }
    Ok(args)
}

fn main() -> ExitCode {
    let (cfg, config_error) = match config::load() {
        Ok(Some(cfg)) => (cfg, None),
        Ok(None) => (config::from_env(), None),
        Err(e) => (config::from_env(), Some(e)),
    };

    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the level (default "info"); the config or
    // JOBTREE_LOG_FORMAT selects compact or JSON lines on stderr.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match cfg.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .init(),
    }

    if let Some(e) = config_error {
        warn!(error = %e, "ignoring unreadable config, using defaults");
    }
    if !cfg.color {
        colored::control::set_override(false);
    }

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}: {}", "Usage error".red(), e);
            eprintln!("  usage: jobtree [--json] [SCENARIO] | jobtree --init");
            return ExitCode::from(2);
        }
    };

    if args.init {
        return init_config();
    }

    match run(&cfg, &args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_config() -> ExitCode {
    let path = config::config_path();
    if path.exists() {
        println!("  Config already exists at {}", path.display().to_string().bold());
        return ExitCode::SUCCESS;
    }
    match config::save(&Config::default()) {
        Ok(()) => {
            println!(
                "  {} Config saved to {}",
                "✓".green().bold(),
                path.display().to_string().bold()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Error saving config".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cfg: &Config, args: &Args) -> Result<(), String> {
    let scenario = match args.scenario.as_ref().or(cfg.scenario.as_ref()) {
        Some(path) => {
            info!(path = %path.display(), "loading scenario");
            Scenario::load_from(path)?
        }
        None => Scenario::demo(),
    };

    let mut world = World::build(&scenario)?;
    info!(
        jobs = world.tree.job_count(),
        processes = render::process_total(&world.tree),
        "tree built"
    );
    if !args.json {
        print_section("Initial tree");
        print_tree(&world, cfg.show_importance);
    }

    for name in &scenario.kill {
        info!(job = %name, "kill requested");
        world.kill(name)?;
    }
    for _ in 0..scenario.oom_kills {
        match world.tree.kill_least_important() {
            Some(id) => info!(job = %id, "out-of-memory kill"),
            None => {
                warn!("no job left to kill for out-of-memory");
                break;
            }
        }
    }
    world.reap();

    if args.json {
        let infos = world.infos();
        let raw = serde_json::to_string_pretty(&infos)
            .map_err(|e| format!("Failed to serialize job info: {}", e))?;
        println!("{raw}");
    } else {
        print_section("After kills");
        print_tree(&world, cfg.show_importance);
    }
    Ok(())
}

fn print_section(title: &str) {
    println!();
    println!("  {}", title.bold().cyan());
    println!("  {}", "─".repeat(title.len()).cyan());
}

fn print_tree(world: &World, show_importance: bool) {
    for line in render::render_tree(&world.tree, show_importance) {
        println!("  {line}");
    }
    println!(
        "  {} jobs, {} live processes",
        world.tree.job_count(),
        world.live_processes()
    );
}
