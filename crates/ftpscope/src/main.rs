//! ftpscope - Measurement file analytics for machine controllers over FTP

mod cli;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ftpscope_core::analysis::{AnalysisEvent, AnalysisMode, AnalysisRequest};
use ftpscope_core::{AnalysisService, Settings};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ftpscope",
    version,
    about = "Measurement file analytics for machine controllers over FTP",
    long_about = "Lists day-folders on a controller's FTP share, downloads measurement files,\n\
                  extracts the value following a keyword and estimates machine runtime.\n\
                  \n\
                  Examples:\n\
                    ftpscope health                                  # Check FTP connectivity\n\
                    ftpscope days 7                                  # Day-folders of machine 7\n\
                    ftpscope latest 7                                # Newest file of machine 7\n\
                    ftpscope analyze 7 \"Durchmesser 1\" --last 50     # Last 50 files\n\
                    ftpscope analyze 7 Tiefe --from 01-03-24 --to 07-03-24\n\
                  \n\
                  Settings are read from --config (default: <config dir>/ftpscope/config.toml\n\
                  when present) and overridden by flags or environment variables."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML settings file
    #[arg(long, env = "FTPSCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// FTP server host
    #[arg(long, env = "FTP_HOST")]
    host: Option<String>,

    /// FTP user
    #[arg(long, env = "FTP_USER")]
    user: Option<String>,

    /// FTP password
    #[arg(long, env = "FTP_PASS", hide_env_values = true)]
    password: Option<String>,

    /// FTP control port
    #[arg(long, env = "FTP_PORT")]
    port: Option<u16>,

    /// Passive data connections (true|false)
    #[arg(long, env = "FTP_PASSIVE")]
    passive: Option<bool>,

    /// Explicit FTPS (true|false)
    #[arg(long, env = "FTP_USE_TLS")]
    tls: Option<bool>,

    /// Maximum concurrent FTP sessions
    #[arg(long, env = "FTP_MAX_CONNECTIONS")]
    max_connections: Option<usize>,

    /// Connect timeout in seconds
    #[arg(long, env = "FTP_CONNECT_TIMEOUT")]
    connect_timeout: Option<u64>,

    /// Socket read timeout in seconds (0 disables)
    #[arg(long, env = "FTP_DATA_TIMEOUT")]
    data_timeout: Option<u64>,

    /// Force output format (json|table)
    #[arg(long, env = "FTPSCOPE_FORMAT", value_parser = ["json", "table"])]
    format: Option<String>,

    /// Disable ANSI colors (log-friendly)
    #[arg(long, env = "FTPSCOPE_NO_COLOR")]
    no_color: bool,

    /// Debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Check that an FTP session can be opened
    Health,
    /// List accepted machine ids
    Machines,
    /// List a machine's day-folders
    Days {
        machine: u32,
    },
    /// Show the most recent data file of a machine
    Latest {
        machine: u32,
    },
    /// Extract keyword values and estimate machine runtime
    Analyze {
        machine: u32,
        /// Keyword preceding the value, e.g. "Durchmesser 1"
        keyword: String,
        /// Analyze the N most recent files
        #[arg(long, short = 'n', conflicts_with_all = ["from", "to"])]
        last: Option<usize>,
        /// First day (DD-MM-YY)
        #[arg(long)]
        from: Option<String>,
        /// Last day, inclusive (DD-MM-YY)
        #[arg(long)]
        to: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "ftpscope=debug,ftpscope_core=debug,warn"
    } else {
        "ftpscope=info,ftpscope_core=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Settings file, then flag and environment overrides
fn load_settings(cli: &Cli) -> Result<Settings> {
    let default_path = dirs::config_dir().map(|dir| dir.join("ftpscope").join("config.toml"));
    let mut settings = match (&cli.config, default_path) {
        (Some(path), _) => Settings::load(path)?,
        (None, Some(path)) if path.exists() => Settings::load(&path)?,
        _ => Settings::default(),
    };

    if let Some(host) = &cli.host {
        settings.host = host.clone();
    }
    if let Some(user) = &cli.user {
        settings.user = user.clone();
    }
    if let Some(password) = &cli.password {
        settings.password = password.clone();
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if let Some(passive) = cli.passive {
        settings.passive = passive;
    }
    if let Some(tls) = cli.tls {
        settings.use_tls = tls;
    }
    if let Some(max) = cli.max_connections {
        settings.max_connections = max;
    }
    if let Some(secs) = cli.connect_timeout {
        settings.connect_timeout_secs = secs;
    }
    if let Some(secs) = cli.data_timeout {
        settings.data_timeout_secs = secs;
    }

    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = load_settings(&cli)?;
    tracing::debug!(?settings, "Settings resolved");
    let service = AnalysisService::from_settings(settings)?;

    let json = cli.format.as_deref() == Some("json");
    let no_color = cli.no_color;

    match cli.command {
        Command::Health => run_health(&service, json).await,
        Command::Machines => {
            println!("{}", cli::format_machines(&service.machines(), json));
            Ok(())
        }
        Command::Days { machine } => run_days(&service, machine, json, no_color).await,
        Command::Latest { machine } => run_latest(&service, machine, json).await,
        Command::Analyze {
            machine,
            keyword,
            last,
            from,
            to,
        } => {
            let request = AnalysisRequest {
                machine,
                keyword,
                mode: if last.is_some() {
                    AnalysisMode::LastX
                } else {
                    AnalysisMode::Date
                },
                start_date: from,
                end_date: to,
                last_x: last,
            };
            run_analyze(&service, request, json, no_color).await
        }
    }
}

async fn run_health(service: &AnalysisService, json: bool) -> Result<()> {
    let connected = service.health().await;
    println!("{}", cli::format_health(service.settings(), connected, json));
    if !connected {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_days(service: &AnalysisService, machine: u32, json: bool, no_color: bool) -> Result<()> {
    service.validate_machine(machine)?;
    let days = service
        .list_days(machine)
        .await
        .with_context(|| format!("Failed to list day-folders of machine {}", machine))?;
    println!("{}", cli::format_days(&days, json, no_color));
    Ok(())
}

async fn run_latest(service: &AnalysisService, machine: u32, json: bool) -> Result<()> {
    match service.latest_file(machine).await? {
        Some(latest) => {
            println!("{}", cli::format_latest(&latest, json));
            Ok(())
        }
        None => bail!("No data files found for machine {}", machine),
    }
}

async fn run_analyze(
    service: &AnalysisService,
    request: AnalysisRequest,
    json: bool,
    no_color: bool,
) -> Result<()> {
    let bar = if json {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(1000);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
                .context("Invalid progress template")?
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        bar
    };

    let mut events = service.spawn_analysis(request);
    let mut terminal = None;
    while let Some(event) = events.recv().await {
        match event {
            AnalysisEvent::Progress { progress, stage } => {
                // Concurrent files interleave, so keep the bar monotonic
                let position = (progress.clamp(0.0, 1.0) * 1000.0) as u64;
                if position > bar.position() {
                    bar.set_position(position);
                }
                bar.set_message(stage.to_string());
            }
            other => terminal = Some(other),
        }
    }
    bar.finish_and_clear();

    match terminal {
        Some(AnalysisEvent::Done(report)) => {
            println!("{}", cli::format_report(&report, json, no_color));
            if !report.failures.is_empty() && !json {
                eprintln!("{} file(s) failed:", report.failures.len());
                for failure in &report.failures {
                    eprintln!("  - {}: {}", failure.remote_path, failure.reason);
                }
            }
            Ok(())
        }
        Some(AnalysisEvent::Failed {
            message,
            client_error,
        }) => {
            if client_error {
                bail!("Invalid request: {}", message)
            }
            bail!("Analysis failed: {}", message)
        }
        _ => bail!("Analysis ended without a result"),
    }
}
