//! Planner CLI.
//!
//! Single binary that provides:
//! - `planner step` - pick the next action for a session
//! - `planner plan` - build a full plan, optionally grouped in parallel steps
//! - `planner successions` - dump the domain successor caches
//! - `planner check` - validate a session and its JSON round trip

mod config;
mod session;

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use planner_core::Goal;
use planner_search::{
    look_for_an_action_to_do, look_for_resolution_plan_with_goals, notify_action_done,
    to_parallel_plan, PlannerStep,
};
use tracing_subscriber::{fmt, EnvFilter};

use config::PlannerConfig;
use session::{load_historical, save_historical, Session};

#[derive(Parser)]
#[command(name = "planner")]
#[command(about = "Contextual planner for prioritized goals", version)]
struct Cli {
    /// Project root directory
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select the next action to do
    Step {
        /// Session file
        session: PathBuf,

        /// Keep applying selected actions until nothing is left to do
        #[arg(long)]
        repeat: bool,

        /// Write the updated session back
        #[arg(long)]
        save: bool,
    },

    /// Build a plan for every goal
    Plan {
        /// Session file
        session: PathBuf,

        /// Group actions that can run together
        #[arg(long)]
        parallel: bool,

        /// Only group the first step
        #[arg(long)]
        only_first_step: bool,
    },

    /// Print the successor caches of the domain
    Successions {
        /// Session file
        session: PathBuf,
    },

    /// Validate a session and its serialization
    Check {
        /// Session file
        session: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    let project_root = match cli.project {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let mut config = PlannerConfig::load_from_project(&project_root)?;
    config.resolve_paths(&project_root);

    match cli.command {
        Commands::Step {
            session,
            repeat,
            save,
        } => run_step(&config, &session, repeat, save),
        Commands::Plan {
            session,
            parallel,
            only_first_step,
        } => {
            config.parallel |= parallel || only_first_step;
            config.only_first_step |= only_first_step;
            run_plan(&config, &session)
        }
        Commands::Successions { session } => {
            let session = Session::load(&session)?;
            print!("{}", session.domain.print_successions());
            Ok(())
        }
        Commands::Check { session } => run_check(&session),
    }
}

fn run_step(config: &PlannerConfig, path: &Path, repeat: bool, save: bool) -> Result<()> {
    let mut session = Session::load(path)?;
    let mut global = match &config.historical_path {
        Some(path) => Some(load_historical(path)?),
        None => None,
    };
    let max_ticks = if repeat {
        config.max_ticks.unwrap_or(usize::MAX)
    } else {
        1
    };

    let mut ticks = 0;
    while ticks < max_ticks {
        let now = Some(Utc::now());
        let Some(step) =
            look_for_an_action_to_do(&mut session.problem, &session.domain, now, global.as_ref())
        else {
            println!("No action to do");
            break;
        };
        print_step(&step);
        ticks += 1;
        if !(repeat || save) {
            break;
        }
        if let Some(global) = global.as_mut() {
            global.notify_action_done(&step.action_instance.action_id);
        }
        notify_action_done(&mut session.problem, &session.domain, &step, now);
    }
    if repeat && ticks == max_ticks {
        tracing::warn!(ticks, "Stopped at the tick limit");
    }

    if save {
        session.save(path)?;
        if let (Some(path), Some(global)) = (&config.historical_path, &global) {
            save_historical(path, global)?;
        }
    }
    Ok(())
}

fn run_plan(config: &PlannerConfig, path: &Path) -> Result<()> {
    let session = Session::load(path)?;
    let mut global = match &config.historical_path {
        Some(path) => Some(load_historical(path)?),
        None => None,
    };
    let now = Some(Utc::now());
    let goals: Vec<Goal> = session
        .problem
        .goal_stack
        .iter()
        .map(|(_, goal)| goal.clone())
        .collect();

    let mut working = session.problem.clone();
    let plan = look_for_resolution_plan_with_goals(&mut working, &session.domain, now, global.as_mut());
    tracing::info!(steps = plan.len(), remaining_goals = working.goal_stack.len(), "Planning done");

    if config.parallel {
        let parallel = to_parallel_plan(
            plan,
            config.only_first_step,
            &session.problem,
            &session.domain,
            &goals,
            now,
        );
        for (index, step) in parallel.iter().enumerate() {
            let actions: Vec<String> = step
                .iter()
                .map(|step| step.action_instance.to_string())
                .collect();
            println!("{}: {}", index + 1, actions.join(" | "));
        }
    } else {
        for step in &plan {
            print_step(step);
        }
    }

    if let (Some(path), Some(global)) = (&config.historical_path, &global) {
        save_historical(path, global)?;
    }
    Ok(())
}

fn run_check(path: &Path) -> Result<()> {
    let session = Session::load(path)?;
    let text = serde_json::to_string_pretty(&session)?;
    let reparsed: Session = serde_json::from_str(&text)?;
    if reparsed != session || serde_json::to_string_pretty(&reparsed)? != text {
        bail!("Session {} does not survive a JSON round trip", path.display());
    }

    println!("Session {}", path.display());
    println!("  actions:    {}", session.domain.actions().len());
    println!(
        "  inferences: {}",
        session
            .domain
            .set_of_inferences()
            .values()
            .map(|set| set.inferences().len())
            .sum::<usize>()
    );
    println!("  facts:      {}", session.problem.world_state.facts().len());
    println!("  goals:      {}", session.problem.goal_stack.len());
    Ok(())
}

fn print_step(step: &PlannerStep) {
    println!(
        "{} (goal: {}, priority: {})",
        step.action_instance, step.goal, step.priority
    );
}
