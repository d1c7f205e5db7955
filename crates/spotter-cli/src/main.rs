mod check_cmds;
mod config;
mod corpus;
mod plan_cmd;

use clap::{Parser, Subcommand};

use config::SpotterConfig;

#[derive(Parser)]
#[command(name = "spotter", about = "Evidence-grounded strength and nutrition plan generator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a spotter config file and a starter bounds file
    Init {
        /// Command that reads a prompt on stdin and writes a completion to stdout
        #[arg(long, default_value = "llama-run")]
        model: String,
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
    /// Generate a plan from a request JSON file
    Plan {
        /// Path to the request JSON file
        request: String,
        /// Bounds TOML file (defaults to the config-dir bounds.toml)
        #[arg(long)]
        bounds: Option<String>,
        /// Model command (overrides SPOTTER_MODEL env var)
        #[arg(long)]
        model: Option<String>,
        /// Write the response JSON here instead of stdout
        #[arg(long)]
        out: Option<String>,
    },
    /// Check a plan against a trainee profile and the safety bounds
    Validate {
        /// Path to the plan JSON file
        plan: String,
        /// Path to the trainee profile JSON file
        profile: String,
        /// Bounds TOML file (defaults to the config-dir bounds.toml)
        #[arg(long)]
        bounds: Option<String>,
    },
    /// Check a plan's citations against corpus chunk files
    Ground {
        /// Path to the plan JSON file
        plan: String,
        /// Corpus chunk files the citations must resolve against
        #[arg(required = true)]
        chunks: Vec<String>,
    },
    /// Check a bounds file for consistency
    Bounds {
        /// Bounds TOML file (defaults to the config-dir bounds.toml)
        file: Option<String>,
    },
}

/// Execute the `spotter init` command: write config and starter bounds.
fn cmd_init(model: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        corpus: config::CorpusSection::default(),
        model: config::ModelSection {
            program: model.to_string(),
            args: vec![],
            timeout_secs: 120,
        },
        limits: config::LimitsSection::default(),
    };
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  model.program = {model}");

    let bounds_file = config::bounds_path();
    if !bounds_file.exists() || force {
        std::fs::write(&bounds_file, config::STARTER_BOUNDS)?;
        println!("Starter bounds written to {}", bounds_file.display());
    }

    println!();
    println!("Next: set corpus paths in the config file, then run `spotter plan <request.json>`.");

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { model, force } => {
            cmd_init(&model, force)?;
        }
        Commands::Plan {
            request,
            bounds,
            model,
            out,
        } => {
            let resolved = SpotterConfig::resolve(model.as_deref())?;
            plan_cmd::run_plan(&resolved, &request, bounds.as_deref(), out.as_deref()).await?;
        }
        Commands::Validate {
            plan,
            profile,
            bounds,
        } => {
            check_cmds::run_validate(&plan, &profile, bounds.as_deref())?;
        }
        Commands::Ground { plan, chunks } => {
            check_cmds::run_ground(&plan, &chunks)?;
        }
        Commands::Bounds { file } => {
            check_cmds::run_bounds(file.as_deref())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod test_util {
    use std::sync::{Mutex, MutexGuard, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    /// Serialize tests that mutate process environment variables.
    pub fn lock_env() -> MutexGuard<'static, ()> {
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
