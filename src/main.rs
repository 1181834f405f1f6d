use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use timelapse::catalog::{Catalog, PRODUCT_CATALOG_URL};
use timelapse::planner::HttpCatalog;
use timelapse::{RunController, RunSettings, UrlPlanner};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(version, about = "Download satellite imagery for a date range and make a timelapse")]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a settings template
    Template { path: PathBuf },
    /// Query the catalog and write the planned items as JSON
    Plan {
        settings: PathBuf,
        #[arg(short, long, default_value = "download_plan.json")]
        output: PathBuf,
    },
    /// Download the frames and assemble the video
    Run {
        settings: PathBuf,
        /// Keep the frames but skip the encoder
        #[arg(long)]
        no_video: bool,
    },
    /// List the products offered by the catalog
    Products {
        #[arg(long, default_value = PRODUCT_CATALOG_URL)]
        url: String,
        /// Only show products whose path contains this text
        #[arg(long)]
        filter: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Template { path } => {
            let settings = RunSettings::from_template(&RunSettings::template())?;
            settings.write(&path)?;
            info!("Wrote settings template to {path:?}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Plan { settings, output } => plan(settings, output).await,
        Command::Run { settings, no_video } => run(settings, no_video).await,
        Command::Products { url, filter } => products(&url, filter.as_deref()).await,
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_settings(path: &Path) -> Result<RunSettings> {
    let settings =
        RunSettings::read(path).with_context(|| format!("Unable to read settings {path:?}"))?;
    settings.validate()?;
    Ok(settings)
}

async fn plan(settings: PathBuf, output: PathBuf) -> Result<ExitCode> {
    let settings = load_settings(&settings)?;
    let client = reqwest::Client::builder()
        .timeout(settings.request_timeout())
        .build()?;
    let catalog = HttpCatalog::new(client, Url::parse(&settings.catalog_url)?);

    let plan = UrlPlanner::new(Arc::new(catalog))
        .plan(&settings.date_range()?, &settings.product)
        .await;
    plan.write(&output)?;
    info!("Wrote {} planned items to {output:?}", plan.len());
    Ok(ExitCode::SUCCESS)
}

async fn run(settings: PathBuf, no_video: bool) -> Result<ExitCode> {
    let settings = load_settings(&settings)?;
    let mut controller = RunController::new(settings)?;
    if no_video {
        controller = controller.without_video();
    }

    let handle = controller.start();
    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Cancelling, waiting for in-flight downloads to finish...");
            cancel.cancel();
        }
    });

    let report = handle.wait().await?;
    info!(
        "{}: {} planned, {} frames, {} missing, {} failed{}",
        report.name,
        report.planned,
        report.frames,
        report.fetch.not_found,
        report.fetch.failed,
        if report.cancelled { " (cancelled)" } else { "" }
    );

    match report.video {
        Some(video) if video.success() => {
            info!("Video written to {:?}", report.video_path);
            Ok(ExitCode::SUCCESS)
        }
        Some(video) => {
            warn!("Encoder exited with {:?}", video.status.code());
            let code = video
                .status
                .code()
                .and_then(|code| u8::try_from(code).ok())
                .filter(|code| *code != 0)
                .unwrap_or(1);
            Ok(ExitCode::from(code))
        }
        None => Ok(ExitCode::SUCCESS),
    }
}

async fn products(url: &str, filter: Option<&str>) -> Result<ExitCode> {
    let catalog = Catalog::fetch(&reqwest::Client::new(), url).await?;
    let filter = filter.map(str::to_lowercase);

    let leaves = catalog
        .leaves()
        .into_iter()
        .filter(|(path, _)| {
            filter
                .as_deref()
                .map_or(true, |f| path.to_lowercase().contains(f))
        })
        .collect::<Vec<_>>();
    if leaves.is_empty() {
        bail!("No products matched");
    }
    for (path, pattern) in leaves {
        println!("{path}\t{pattern}");
    }
    Ok(ExitCode::SUCCESS)
}
