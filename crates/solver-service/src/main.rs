//! Entry point for the solver binary.
//!
//! Loads configuration, builds the `SolverEngine`, and runs it until signalled.
//! Optionally runs a read-only HTTP status surface alongside it (SPEC_FULL.md §10).

use clap::{Parser, Subcommand};
use solver_config::Config;
use solver_core::SolverEngine;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

mod apis;
mod server;

/// Command-line arguments for the solver service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	#[command(subcommand)]
	command: Option<Command>,

	/// Path to configuration file.
	#[arg(short, long, default_value = "config.toml", global = true)]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error). Overrides `logLevel` from config.
	#[arg(short, long, global = true)]
	log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the solver engine until signalled. The default if no subcommand is given.
	Solver,
	/// Developer helper subcommands; not part of the core solver.
	Tools {
		#[command(subcommand)]
		command: ToolsCommand,
	},
}

#[derive(Subcommand, Debug)]
enum ToolsCommand {
	/// Prints what it would take to open a test order between two configured chains.
	///
	/// Submitting the `Open` transaction itself is a settler-contract action outside
	/// `ChainAdapter`'s scope (the adapter only observes `Open`, it doesn't emit one);
	/// this command validates the configured chain pair and stops there.
	OpenOrder {
		origin: String,
		destination: Option<String>,
	},
}

fn init_tracing(log_level: Option<&str>, log_format: Option<&str>) {
	use tracing_subscriber::{fmt, EnvFilter};

	let directive = log_level.unwrap_or("info").to_string();
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

	if log_format == Some("json") {
		fmt().with_env_filter(env_filter).json().init();
	} else {
		fmt().with_env_filter(env_filter).with_target(true).init();
	}
}

#[tokio::main]
async fn main() -> ExitCode {
	let args = Args::parse();

	let config = match Config::from_file(args.config.to_str().expect("config path must be valid UTF-8")) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("failed to load configuration: {e}");
			return ExitCode::from(1);
		}
	};

	init_tracing(
		args.log_level.as_deref().or(config.log_level.as_deref()),
		config.log_format.as_deref(),
	);

	match args.command.unwrap_or(Command::Solver) {
		Command::Solver => run_solver(config).await,
		Command::Tools {
			command: ToolsCommand::OpenOrder { origin, destination },
		} => run_open_order_tool(&config, &origin, destination.as_deref()),
	}
}

async fn run_solver(config: Config) -> ExitCode {
	tracing::info!(solver_id = %config.solver.id, "starting solver");

	let api_config = config.api.clone();
	let engine = match SolverEngine::build(config).await {
		Ok(engine) => Arc::new(engine),
		Err(e) => {
			tracing::error!(error = %e, "failed to build solver engine");
			return ExitCode::from(1);
		}
	};

	let api_enabled = api_config.as_ref().is_some_and(|api| api.enabled);

	let result: anyhow::Result<()> = if api_enabled {
		let api_config = api_config.expect("checked above");
		let api_engine = engine.clone();
		tokio::select! {
			result = engine.run() => result.map_err(anyhow::Error::from),
			result = server::start_server(api_config, api_engine) => result,
		}
	} else {
		engine.run().await.map_err(anyhow::Error::from)
	};

	match result {
		Ok(()) => {
			tracing::info!("solver stopped cleanly");
			ExitCode::from(0)
		}
		Err(e) => {
			tracing::error!(error = %e, "solver stopped with an error");
			ExitCode::from(2)
		}
	}
}

fn run_open_order_tool(config: &Config, origin: &str, destination: Option<&str>) -> ExitCode {
	let Some(origin_chain) = config.chains.iter().find(|c| c.name == origin) else {
		eprintln!("unknown origin chain '{origin}'");
		return ExitCode::from(1);
	};
	if let Some(destination) = destination {
		if !config.chains.iter().any(|c| c.name == destination) {
			eprintln!("unknown destination chain '{destination}'");
			return ExitCode::from(1);
		}
	}
	println!(
		"would open a test order from '{}' (chain id {}) to {}",
		origin_chain.name,
		origin_chain.chain_id,
		destination.unwrap_or("<any configured destination>"),
	);
	println!("submitting the Open transaction itself is outside this tool's scope; use the origin settler's own tooling");
	ExitCode::from(0)
}
