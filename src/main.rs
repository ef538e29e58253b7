mod config;
mod download;
mod error;
mod report;
mod segment;
mod session;

use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use config::Settings;
use segment::assign::Assignment;
use segment::items::AssetName;
use segment::Segmentation;
use session::http::HttpSession;
use session::{listing, ReportSession};

#[derive(Parser)]
#[command(name = "cycles_reports", about = "Download monthly cycle reports sorted by asset")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download one report into reports/<year>/<month>/<asset>/
    Download {
        /// Report URL (skips discovery)
        #[arg(long)]
        url: Option<String>,
        /// Year to pick a report from (default: current year)
        #[arg(short, long)]
        year: Option<String>,
        /// Which report of that year, 0 = first listed
        #[arg(short = 'n', long, default_value = "0")]
        nth: usize,
    },
    /// List report URLs for a year without downloading
    List {
        /// Year to list (default: current year)
        #[arg(short, long)]
        year: Option<String>,
    },
    /// Show how a report's images would be split, without downloading
    Plan {
        /// Report URL
        #[arg(long)]
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = run(cli.command, &settings).await;

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run(command: Commands, settings: &Settings) -> anyhow::Result<()> {
    let session = HttpSession::connect(&settings.site, &settings.credentials).await?;
    match command {
        Commands::List { year } => {
            let year = year.unwrap_or_else(config::current_year);
            let reports = listing::discover(&session, &year).await?;
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        Commands::Download { url, year, nth } => {
            let url = match url {
                Some(url) => url,
                None => {
                    let year = year.unwrap_or_else(config::current_year);
                    let reports = listing::discover(&session, &year).await?;
                    if reports.is_empty() {
                        println!("No reports found for year {}", year);
                        return Ok(());
                    }
                    let picked = reports.get(nth).ok_or_else(|| {
                        error::ReportError::NotFound(format!(
                            "Only {} reports found for {}, requested index {}",
                            reports.len(),
                            year,
                            nth
                        ))
                    })?;
                    println!("Selected report [{}/{}]: {}", nth, reports.len(), picked.title);
                    picked.url.clone()
                }
            };

            let summary = report::download_report(&session, &url, settings)
                .await
                .with_context(|| format!("Report {} failed", url))?;
            print_counts(&summary.segmentation.assignment);
            for r in &summary.records {
                if let download::Outcome::Failed(reason) = &r.outcome {
                    println!("  FAILED [{}] {} -> {}: {}", r.index, r.asset, r.path.display(), reason);
                }
            }
            if summary.protection != session::ProtectionState::None {
                println!("Page reported {}; some images may be missing", summary.protection);
            }
            println!(
                "Metadata: {} images, sections {:?}",
                summary.metadata.images, summary.metadata.sections
            );
            println!(
                "Done: {} written, {} skipped (exists), {} failed. Report saved to {}",
                summary.written(),
                summary.skipped(),
                summary.failed(),
                summary.dir.display()
            );
        }
        Commands::Plan { url } => {
            let page = session.open_report(&url).await?;
            report::report_protection(&page);
            let segmentation = report::plan(&page, &settings.segmentation)?;
            println!("Report: {}", page.title);
            println!(
                "Folder: {}",
                settings
                    .reports_dir
                    .join(report::title_to_path(&page.title))
                    .display()
            );
            print_plan(&segmentation);
            print_counts(&segmentation.assignment);
        }
    }
    Ok(())
}

fn print_plan(seg: &Segmentation) {
    let b = &seg.boundaries;
    println!(
        "Images: {} | content starts at {} | review starts at {} | dividers {:?}",
        b.total, b.content_start, b.review_start, b.dividers
    );
    println!("Mode: {:?}", seg.mode);
    println!("{:<8} | {:>5} | {:>5} | {:>5}", "Section", "Start", "End", "Count");
    println!("{}", "-".repeat(33));
    for s in &seg.sections {
        let note = if s.is_empty() { "  (empty)" } else { "" };
        println!("{:<8} | {:>5} | {:>5} | {:>5}{}", s.asset, s.start, s.end, s.len(), note);
    }
}

fn print_counts(assignment: &Assignment) {
    if assignment.is_empty() {
        println!("\nNo images found");
        return;
    }
    let counts = assignment.counts();
    println!("\nFound {} images:", assignment.len());
    for asset in AssetName::ALL {
        if let Some(n) = counts.get(&asset) {
            println!("  {}: {} images", asset, n);
        }
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
