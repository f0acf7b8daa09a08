mod context;
mod render;

use std::{error::Error, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use tracing::info;
use vfm_explorer::{CommandRef, TreeView};
use vfm_util::AppConfig;

use context::AppContext;
use render::ConsoleSink;

#[derive(Parser)]
#[command(name = "vfm", version, about = "VFM log explorer and device retrieval")]
struct Cli {
    /// adb binary to use instead of the resolved one
    #[arg(long, global = true)]
    adb: Option<String>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print the log folder tree
    Tree {
        /// Folder to browse instead of the configured log root
        #[arg(long)]
        root: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        depth: usize,
    },
    /// List the action entries and their command ids
    Actions,
    /// Run the command behind a tree entry
    Invoke {
        command_id: String,
        arg: Option<String>,
    },
    /// List connected devices
    Devices,
    /// Connect a wireless device (ip:port)
    Connect { addr: String },
    /// Pull the device log folder into the log root
    Pull {
        #[arg(long)]
        remote: Option<String>,
        #[arg(long)]
        dest: Option<PathBuf>,
    },
    /// Print a pulled log file
    Open { path: PathBuf },
    /// Show recent retrievals
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print the effective configuration
    Config {
        /// Persist the effective values (including --adb) to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    if let Err(err) = vfm_util::init_tracing() {
        eprintln!("failed to initialise logging: {err}");
    }
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    let mut config = AppConfig::load();
    if let Some(adb) = cli.adb {
        config.adb_path = adb;
    }
    match &cli.cmd {
        Cmd::Tree { root: Some(root), .. } => config.log_root = root.display().to_string(),
        Cmd::Pull { remote, dest } => {
            if let Some(remote) = remote {
                config.remote_log_dir = remote.clone();
            }
            if let Some(dest) = dest {
                config.log_root = dest.display().to_string();
            }
        }
        _ => {}
    }
    let ctx = AppContext::new(config);

    match cli.cmd {
        Cmd::Tree { depth, .. } => {
            let mut view = ctx.explorer_view();
            view.expand_to_depth(depth).await;
            print_view(&view);
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Actions => {
            let mut view = ctx.actions_view();
            view.render().await;
            print_view(&view);
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Invoke { command_id, arg } => {
            let Some(command) = CommandRef::from_id(&command_id, arg.as_deref()) else {
                return Err(format!("unknown command {command_id}").into());
            };
            dispatch(&ctx, command, arg.as_deref()).await
        }
        Cmd::Devices => {
            let devices = ctx.pipeline.bridge().list_connected_devices().await?;
            if devices.is_empty() {
                println!("no device connected");
            }
            for device in devices {
                println!("{}\t{}", device.serial, device.state);
            }
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Connect { addr } => dispatch(&ctx, CommandRef::ConnectDevice, Some(&addr)).await,
        Cmd::Pull { .. } => dispatch(&ctx, CommandRef::PullLogs, None).await,
        Cmd::Open { path } => dispatch(&ctx, CommandRef::OpenFile(path), None).await,
        Cmd::History { limit } => {
            let records = ctx.history.load().await;
            if records.is_empty() {
                println!("no retrievals recorded in {}", ctx.history.path().display());
            }
            let skip = records.len().saturating_sub(limit);
            for record in records.iter().skip(skip) {
                println!("{}", render::format_record(record));
            }
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Config { save } => {
            let config = &ctx.config;
            println!("adb_path\t{}", ctx.pipeline.bridge().adb_path().display());
            println!("log_root\t{}", config.log_root_path().display());
            println!("remote_log_dir\t{}", config.remote_log_dir);
            if save {
                config.save()?;
                println!("saved {}", vfm_util::config::config_path().display());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn dispatch(
    ctx: &AppContext,
    command: CommandRef,
    arg: Option<&str>,
) -> Result<ExitCode, Box<dyn Error>> {
    info!("running {}", command.id());
    match command {
        CommandRef::OpenFile(path) => {
            let data = tokio::fs::read(&path).await?;
            print!("{}", String::from_utf8_lossy(&data));
            Ok(ExitCode::SUCCESS)
        }
        CommandRef::PullLogs => {
            let mut view = ctx.explorer_view();
            view.render().await;
            // The sink already printed the failure.
            if ctx.trigger_retrieval(&ConsoleSink).await.is_err() {
                return Ok(ExitCode::FAILURE);
            }
            if view.sync().await {
                print_view(&view);
            }
            Ok(ExitCode::SUCCESS)
        }
        CommandRef::ConnectDevice => {
            let addr = arg
                .filter(|value| !value.trim().is_empty())
                .ok_or("vfm.connectDevice needs an ip:port argument")?;
            let output = ctx.pipeline.bridge().connect(addr).await?;
            println!("{output}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_view(view: &TreeView) {
    render::print_tree(&view.provider().root_label(), view.rows());
}
