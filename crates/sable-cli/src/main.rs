use anyhow::Result;
use clap::{Parser, Subcommand};
use sable_optimizer::OptimizationLevel;
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "sable", version, about = "Sable script VM")]
struct Cli {
    /// Config file (default: sable.toml or .sablerc.toml in this or a parent directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log pipeline details
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile, optimize and run an expression
    Eval {
        expr: String,
        /// none, basic, medium or aggressive (or 0-3)
        #[arg(long)]
        level: Option<OptimizationLevel>,
        /// Run natively when possible
        #[arg(long)]
        jit: bool,
    },
    /// Show the bytecode before and after optimization
    Disasm {
        expr: String,
        #[arg(long)]
        level: Option<OptimizationLevel>,
        /// Also list the generated machine code
        #[arg(long)]
        native: bool,
    },
    /// Print optimizer statistics and bytecode analysis
    Stats {
        expr: String,
        #[arg(long)]
        level: Option<OptimizationLevel>,
        /// Emit the statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the tokens and postfix order of an expression
    Tokens { expr: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let mut engine_config = config::load_config(cli.config.as_deref())?
        .into_engine_config()
        .with_env_overrides();

    match cli.command {
        Commands::Eval { expr, level, jit } => {
            if let Some(level) = level {
                engine_config.optimization_level = level;
            }
            engine_config.use_jit |= jit;
            commands::eval::run(engine_config, &expr)?
        }
        Commands::Disasm { expr, level, native } => {
            if let Some(level) = level {
                engine_config.optimization_level = level;
            }
            commands::disasm::run(engine_config, &expr, native)?
        }
        Commands::Stats { expr, level, json } => {
            if let Some(level) = level {
                engine_config.optimization_level = level;
            }
            commands::stats::run(engine_config, &expr, json)?
        }
        Commands::Tokens { expr } => commands::tokens::run(&expr)?,
    }

    Ok(())
}
