use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use muster::config::Config;
use muster::dispatch::HttpTransport;
use muster::orchestration::{Runner, TeamWorkflow};
use muster::{mlog, mlog_error, mlog_warn, Error, Result};

/// Muster - paced, correlated team creation against a person service
#[derive(Parser, Debug)]
#[command(name = "muster")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    \
    MUSTER_CONFIG=PATH   Config file (alternative to --config)\n    \
    MUSTER_DEBUG=1       Enable debug logging (alternative to --debug)\n    \
    MUSTER_LOG=LEVEL     Log level: error, warn, info, debug, trace")]
pub struct Cli {
    /// Config file (default: ~/.muster/muster.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the configured iterations of team workflows (default)
    Run {
        /// Override the number of workflows per iteration
        #[arg(short = 'w', long)]
        workflows: Option<usize>,

        /// Override the number of iterations
        #[arg(short = 'i', long)]
        iterations: Option<usize>,

        /// Print one JSON line per finished workflow on stdout
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    ShowConfig,

    /// Write the default configuration to the user config path
    InitConfig {
        /// Overwrite an existing file
        #[arg(long, short = 'f')]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::InitConfig { force }) = cli.command {
        muster::log::init(cli.debug, cli.log_file.clone());
        return run_init_config(cli.config, force);
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            muster::log::init(cli.debug, cli.log_file.clone());
            mlog_error!("Failed to load config: {}", e);
            return Err(e);
        }
    };
    muster::log::init(cli.debug, cli.log_file.clone().or_else(|| config.log_path()));

    match cli.command {
        Some(Command::ShowConfig) => run_show_config(&config),
        Some(Command::Run {
            workflows,
            iterations,
            json,
        }) => run_workflows(config, workflows, iterations, json),
        None => run_workflows(config, None, None, false),
        Some(Command::InitConfig { .. }) => Ok(()),
    }
}

fn run_show_config(config: &Config) -> Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

fn run_init_config(explicit: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match explicit {
        Some(path) => path,
        None => Config::default_path()?,
    };
    if path.exists() && !force {
        return Err(Error::Validation(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    Config::default().save(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn run_workflows(
    mut config: Config,
    workflows: Option<usize>,
    iterations: Option<usize>,
    json: bool,
) -> Result<()> {
    if let Some(count) = workflows {
        config.workflow_count = count;
    }
    if let Some(count) = iterations {
        config.iteration_count = count;
    }
    config.validate()?;
    let config = Arc::new(config);

    mlog!(
        "Muster starting: {} workflows x {} iterations, {} ms spacing, {} s join timeout",
        config.workflow_count,
        config.iteration_count,
        config.delay_millis,
        config.join_timeout_secs
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(threads) = config.worker_threads {
        builder.worker_threads(threads);
    }
    let runtime = builder.build()?;

    runtime.block_on(async move {
        let transport = Arc::new(HttpTransport::new(config.request_timeout())?);
        let workflow = Arc::new(TeamWorkflow::from_config(&config, transport));
        let runner = Runner::new(config.clone(), workflow).with_json_output(json);

        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                mlog_warn!("Interrupted, stopping after in-flight workflows are abandoned");
                on_signal.cancel();
            }
        });

        let summary = runner.run(cancel).await?;
        if summary.errors > 0 {
            mlog_warn!("{} workflows ended with errors", summary.errors);
        }
        Ok(())
    })
}
