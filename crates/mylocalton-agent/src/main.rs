use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use mylocalton_agent::{
    Arch, Network,
    config::{self, AgentConfig},
    error_payload,
    layout::InstallationLayout,
    poller::StatePoller,
    settings,
    supervisor::{StopOutcome, Supervisor},
};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "mylocalton-agent", version, about = "Manage a local MyLocalTon sandbox")]
struct Cli {
    /// Home directory the installation layout derives from.
    #[arg(long, global = true, env = "MYLOCALTON_HOME")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every path of the installation layout.
    Paths,
    /// Download the artifact for this machine.
    Download {
        #[arg(long)]
        testnet: bool,
        /// Architecture name, e.g. `x86_64` or `aarch64`. Defaults to the host.
        #[arg(long)]
        arch: Option<String>,
    },
    /// Launch the installed artifact in the background.
    Start(StartArgs),
    /// Ask the running artifact to shut down.
    Stop,
    /// Print the current status.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Print status changes until interrupted.
    Watch {
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Wipe blockchain state, keep the download.
    Reset,
    /// Wipe the whole installation.
    Delete,
    /// Print the artifact version.
    Version {
        #[arg(long)]
        jar: Option<PathBuf>,
    },
    /// Print disk usage of the installation.
    Usage,
}

#[derive(Args, Debug)]
struct StartArgs {
    #[arg(long)]
    http_api: bool,
    #[arg(long)]
    explorer: bool,
    #[arg(long)]
    data_generator: bool,
    #[arg(long)]
    nogui: bool,
    #[arg(long)]
    debug: bool,
    /// Additional validators, 0 to 5.
    #[arg(long)]
    validators: Option<u8>,
    /// Jar to launch instead of the preferred installed one.
    #[arg(long)]
    jar: Option<PathBuf>,
}

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_writer, guard) = match config::env_string("MYLOCALTON_AGENT_LOG_DIR") {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, "mylocalton-agent.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
        .init();
    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_tracing();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let msg = err.to_string();
            if msg.starts_with(error_payload::PREFIX) {
                eprintln!("{msg}");
            } else {
                eprintln!(
                    "{}",
                    error_payload::encode("internal", config::format_error_chain(&err), None)
                );
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match cli.home {
        Some(home) => AgentConfig::with_home(home),
        None => AgentConfig::from_env()?,
    };
    let layout = InstallationLayout::new(config.home.clone());
    let supervisor = Supervisor::new(layout.clone(), config.clone());

    match cli.command {
        Command::Paths => print_paths(&layout),
        Command::Download { testnet, arch } => {
            let arch = arch.as_deref().map(Arch::from_name).unwrap_or_else(Arch::detect);
            let network = Network::from_testnet_flag(testnet);
            let mut last = None;
            let path = supervisor
                .download(arch, network, |pct| {
                    if last != Some(pct) {
                        last = Some(pct);
                        eprint!("\rdownloading {arch} {network}: {pct}%");
                    }
                })
                .await
                .map_err(error_payload::anyhow)?;
            eprintln!();
            println!("{}", path.display());
        }
        Command::Start(args) => {
            let defaults = settings::load_startup_settings(&layout.settings_file())
                .context("load startup settings")?
                .launch_defaults();
            let mut launch = defaults;
            launch.http_api |= args.http_api;
            launch.web_explorer |= args.explorer;
            launch.data_generator |= args.data_generator;
            launch.no_gui = args.nogui;
            launch.debug = args.debug;
            launch.set_validator_count(args.validators.unwrap_or(0))?;

            let handle = match args.jar {
                Some(jar) => supervisor.start(&jar, &launch).await,
                None => supervisor.start_installed(&launch).await,
            }
            .map_err(error_payload::anyhow)?;
            println!("started {}", handle.command.join(" "));
            if let Some(pid) = handle.pid {
                println!("launcher pid {pid}");
            }
        }
        Command::Stop => match supervisor.stop().await.map_err(error_payload::anyhow)? {
            StopOutcome::Signalled { pids } => println!("stop signal sent to {pids:?}"),
            StopOutcome::NotRunning => println!("not running"),
        },
        Command::Status { json } => {
            let status = supervisor.refresh().await;
            if json {
                println!("{}", serde_json::to_string(&status)?);
            } else {
                println!("{}", status.label());
            }
        }
        Command::Watch { interval_ms } => {
            let interval = interval_ms
                .map(|v| Duration::from_millis(v.clamp(500, 60_000)))
                .unwrap_or(config.poll_interval);
            let mut poller = StatePoller::new(supervisor.clone(), interval).spawn();
            let mut last_label = None;
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    status = poller.changed() => {
                        let Some(status) = status else { break };
                        let mut label = status.label();
                        if let Some(notice) = &status.message {
                            label = format!("{label} ({notice})");
                        }
                        if last_label.as_ref() != Some(&label) {
                            println!("{label}");
                            last_label = Some(label);
                        }
                    }
                }
            }
        }
        Command::Reset => {
            let report = supervisor.reset().await.map_err(error_payload::anyhow)?;
            println!("reset: removed {} entries", report.removed.len());
        }
        Command::Delete => {
            let report = supervisor.delete().await.map_err(error_payload::anyhow)?;
            println!("delete: removed {} entries", report.removed.len());
        }
        Command::Version { jar } => {
            let version = supervisor
                .version(jar.as_deref())
                .await
                .map_err(error_payload::anyhow)?;
            println!("{version}");
        }
        Command::Usage => {
            let bytes = layout.disk_usage();
            println!("{} ({bytes} bytes)", human_bytes(bytes));
        }
    }
    Ok(())
}

fn print_paths(layout: &InstallationLayout) {
    let rows = [
        ("root", layout.root()),
        ("state", layout.state_dir()),
        ("lock", layout.lock_file()),
        ("settings", layout.settings_file()),
        ("log", layout.log_file()),
        ("lite-client", layout.lite_client()),
        ("tonlib", layout.tonlib()),
        ("global-config", layout.global_config()),
        ("signal-helper", layout.signal_helper()),
    ];
    for (name, path) in rows {
        println!("{name:<14} {}", path.display());
    }
    for a in layout.installed_artifacts() {
        println!("{:<14} {} ({} {})", "artifact", a.path.display(), a.arch, a.network);
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
