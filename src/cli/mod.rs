pub mod report;

use std::{
    io::IsTerminal,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use report::{render_history, render_stats, StatsReport};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{config::Settings, open_stores, start_daemon, sync::reconciler::load_history},
    device::{self, DEVICE_FILE},
    history::HistoryStore,
    utils::{
        clock::{Clock, DefaultClock},
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX, SERVE_PREFIX},
        runtime::single_thread_runtime,
    },
};

#[derive(Parser, Debug)]
#[command(name = "Tallysync", version, long_about = None)]
#[command(about = "Per-day keyboard and mouse counters shared between your devices", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Log level. Overrides RUST_LOG")]
    log_filter: Option<LevelFilter>,
    #[arg(long, global = true, help = "Also print logs to stdout")]
    log_console: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(
        about = "Run the service in the current console. Reads events from stdin until Ctrl-C or SIGTERM"
    )]
    Serve {
        #[arg(long, help = "Shared directory to sync through. Overrides config.toml")]
        remote_dir: Option<PathBuf>,
    },
    #[command(about = "Display today, yesterday, averages and records for every counter")]
    Stats {
        #[arg(long, help = "Print as JSON")]
        json: bool,
    },
    #[command(about = "Display per day totals, newest first")]
    History {
        #[arg(long, default_value_t = 14, help = "Number of days to show")]
        days: usize,
    },
    #[command(about = "Print the identity of this device")]
    Device {},
}

/// Time given to blocking stdin reads before the runtime is torn down.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(200);

pub fn run_cli() -> Result<()> {
    let args = Args::parse();

    let dir = match args.dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            dir
        }
        None => create_application_default_path()?,
    };
    let prefix = match args.commands {
        Commands::Serve { .. } => SERVE_PREFIX,
        _ => CLI_PREFIX,
    };
    enable_logging(prefix, &dir, args.log_filter, args.log_console)?;

    let mut settings = Settings::load(&dir)?;
    let runtime = single_thread_runtime()?;

    match args.commands {
        Commands::Serve { remote_dir } => {
            if remote_dir.is_some() {
                settings.remote_dir = remote_dir;
            }
            let result = runtime.block_on(start_daemon(&dir, &settings));
            runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
            result
        }
        Commands::Stats { json } => {
            let history = runtime.block_on(load_merged_history(&dir, &settings))?;
            let today = DefaultClock.today();
            let report = StatsReport {
                today: history.day(today).map(|v| v.totals()).unwrap_or_default(),
                stats: history.compute_rolling_stats(today),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render_stats(&report, std::io::stdout().is_terminal()));
            }
            Ok(())
        }
        Commands::History { days } => {
            let history = runtime.block_on(load_merged_history(&dir, &settings))?;
            print!(
                "{}",
                render_history(history.all_days(), days, std::io::stdout().is_terminal())
            );
            Ok(())
        }
        Commands::Device {} => {
            println!("{}", device::load_or_create(&dir.join(DEVICE_FILE))?);
            Ok(())
        }
    }
}

/// Local history joined in memory with whatever the remote holds. Nothing is written back.
async fn load_merged_history(dir: &Path, settings: &Settings) -> Result<HistoryStore> {
    let device = device::load_or_create(&dir.join(DEVICE_FILE))?;
    let (local, remote) = open_stores(dir, settings)?;
    let mut history = HistoryStore::new(device);
    load_history(&mut history, &local, remote.as_deref()).await;
    Ok(history)
}
