use std::path::PathBuf;

use clap::{Parser, Subcommand};

use fanout::config::Config;
use fanout::worker::DemoWorker;
use fanout::{batch_len, flog, flog_error, Executor, FailurePolicy, Result};

/// fanout - run a batch of independent work concurrently and collect the results in order
#[derive(Parser, Debug)]
#[command(name = "fanout")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    FANOUT_DEBUG=1       Enable debug logging (alternative to --debug)\n    FANOUT_DEBUG=trace   Also log every task completion")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.fanout/fanout.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Configuration file (defaults to ~/.fanout/fanout.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run one batch of the demo worker and print the ordered results as JSON
    Run {
        /// Number of tasks to launch
        #[arg(short = 'n', long, default_value_t = 3, allow_negative_numbers = true)]
        count: i64,

        /// Failure policy (overrides the config file)
        #[arg(long, value_enum)]
        policy: Option<FailurePolicy>,

        /// How long each task sleeps, in milliseconds
        #[arg(long)]
        sleep_ms: Option<u64>,

        /// Make the task at this launch index fail
        #[arg(long)]
        fail_index: Option<usize>,

        /// Give up waiting after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Maximum number of tasks running at once
        #[arg(long)]
        max_concurrency: Option<usize>,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    fanout::log::init(cli.debug);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Run {
            count,
            policy,
            sleep_ms,
            fail_index,
            timeout_ms,
            max_concurrency,
        } => {
            let config = apply_overrides(config, policy, sleep_ms, timeout_ms, max_concurrency);
            let result = run_batch(&config, count, fail_index);
            if let Err(e) = &result {
                flog_error!("Batch failed: {}", e);
            }
            result
        }
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

/// Layer command-line flags over the loaded configuration.
fn apply_overrides(
    mut config: Config,
    policy: Option<FailurePolicy>,
    sleep_ms: Option<u64>,
    timeout_ms: Option<u64>,
    max_concurrency: Option<usize>,
) -> Config {
    if let Some(policy) = policy {
        config.executor.policy = policy;
    }
    if let Some(sleep_ms) = sleep_ms {
        config.worker.sleep_ms = sleep_ms;
    }
    if timeout_ms.is_some() {
        config.executor.timeout_ms = timeout_ms;
    }
    if max_concurrency.is_some() {
        config.pool.max_concurrency = max_concurrency;
    }
    config
}

fn run_batch(config: &Config, count: i64, fail_index: Option<usize>) -> Result<()> {
    let n = batch_len(count)?;
    let executor = Executor::from_config(config)?;
    let worker = DemoWorker::from_config(&config.worker).with_fail_index(fail_index);

    flog!(
        "Running batch of {} tasks (policy={}, sleep={:?})",
        n,
        executor.policy(),
        worker.sleep()
    );

    let report = executor.run_blocking(n, move |index| worker.value(index))?;

    flog!(
        "Batch {} finished in {}ms: {} succeeded, {} failed",
        report.batch_id.short(),
        report.elapsed_ms,
        report.succeeded(),
        report.failed()
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
