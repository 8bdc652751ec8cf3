use crate::config::config::{HarnessConfig, SandboxKind};
use crate::config::types::{ExitClass, Result as HarnessResult};
use crate::core::status::terminate;
use crate::core::supervisor::Supervisor;
use crate::core::workload::BuiltinWorkload;
use crate::exec::sandbox::{spawn_sandboxed, SandboxConfiguration, WorkerExit};
use crate::safety::cleanup::remove_dir_tree;
use crate::safety::workspace::setup_main_process;
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG still overrides)
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the iteration loop inside a sandbox
    Run {
        /// Sandbox policy: none, setuid or namespace
        #[arg(long)]
        sandbox: Option<SandboxKind>,
        /// Built-in workload: noop, hang, probe or fault
        #[arg(long, default_value = "probe")]
        workload: BuiltinWorkload,
        /// Per-iteration deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Stop after this many iterations
        #[arg(long)]
        iterations: Option<u64>,
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Remove a directory tree, unmounting anything mounted inside it
    Reclaim {
        /// Directory to remove
        dir: PathBuf,
    },
}

fn init_logging(debug: bool) -> Result<()> {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {}", e))
}

fn load_config(
    path: Option<&Path>,
    sandbox: Option<SandboxKind>,
    timeout_ms: Option<u64>,
    iterations: Option<u64>,
) -> HarnessResult<HarnessConfig> {
    let mut config = match path {
        Some(path) => HarnessConfig::load_from_file(path)?,
        None => HarnessConfig::default(),
    };
    if let Some(sandbox) = sandbox {
        config.sandbox = sandbox;
    }
    if let Some(timeout_ms) = timeout_ms {
        config.iteration_timeout_ms = timeout_ms;
    }
    if iterations.is_some() {
        config.max_iterations = iterations;
    }
    config.validate()?;
    Ok(config)
}

/// Main process: create the work root, start the loop process under the
/// selected sandbox, and relay its exit status.
fn run_harness(config: HarnessConfig, workload: BuiltinWorkload) -> HarnessResult<i32> {
    let root = setup_main_process(Path::new(&config.workdir_template))?;
    log::info!(
        "Work root {} (sandbox {:?}, workload {:?})",
        root.display(),
        config.sandbox,
        workload
    );

    let sandbox = SandboxConfiguration::from_config(&config);
    let worker = spawn_sandboxed(&sandbox, || Supervisor::new(&config, ".", workload).run())?;
    let exit = worker.wait()?;
    let code = exit.exit_code();
    match (exit, ExitClass::from_code(code)) {
        (WorkerExit::Exited(_), Some(class)) => {
            log::info!("Loop process exited with {:?} (status {})", class, code)
        }
        _ => log::info!("Loop process ended: {:?}", exit),
    }
    Ok(code)
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug)?;

    match cli.command {
        Commands::Run {
            sandbox,
            workload,
            timeout_ms,
            iterations,
            config,
        } => {
            let result = load_config(config.as_deref(), sandbox, timeout_ms, iterations)
                .and_then(|config| run_harness(config, workload));
            match result {
                Ok(code) => std::process::exit(code),
                Err(e) => terminate(&e),
            }
        }
        Commands::Reclaim { dir } => match remove_dir_tree(&dir) {
            Ok(stats) => {
                println!(
                    "removed {} (unmounts={}, relists={}, read-only skips={})",
                    dir.display(),
                    stats.unmounts,
                    stats.relists,
                    stats.read_only_skips
                );
                Ok(())
            }
            Err(e) => terminate(&e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "fuzzbox",
            "run",
            "--sandbox",
            "setuid",
            "--workload",
            "hang",
            "--timeout-ms",
            "250",
            "--iterations",
            "3",
        ])
        .unwrap();
        let Commands::Run {
            sandbox,
            workload,
            timeout_ms,
            iterations,
            config,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(workload, BuiltinWorkload::Hang);
        let config = load_config(config.as_deref(), sandbox, timeout_ms, iterations).unwrap();
        assert_eq!(config.sandbox, SandboxKind::Setuid);
        assert_eq!(config.iteration_timeout_ms, 250);
        assert_eq!(config.max_iterations, Some(3));
    }

    #[test]
    fn unknown_sandbox_is_rejected_at_parse_time() {
        assert!(Cli::try_parse_from(["fuzzbox", "run", "--sandbox", "chroot"]).is_err());
    }

    #[test]
    fn zero_timeout_fails_validation() {
        assert!(load_config(None, None, Some(0), None).is_err());
    }
}
