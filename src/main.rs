mod analytics;
mod config;
mod executor;
mod orchestrator;
mod report;
mod sonar;
mod store;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

use crate::analytics::Analytics;
use crate::executor::{DockerCli, ScanExecutor};
use crate::orchestrator::ScanOrchestrator;
use crate::sonar::SonarClient;
use crate::store::{ScanStore, SqliteStore};

/// Repo Scanner: runs a containerized linter and code analysis service over a
/// repository, stores the results and reports quality trends per project.
#[derive(Parser, Debug)]
#[command(name = "repo-scanner", version, about)]
struct Cli {
    /// Config file (defaults to .repo-scanner.toml in the current directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a repository and store its results
    Scan {
        /// Git URL of the repository (e.g., https://github.com/org/repo.git)
        repo_url: String,

        #[arg(short, long)]
        user: i64,
    },

    /// Show trend and latest breakdowns for a project
    Analytics {
        project_id: i64,

        #[arg(short, long)]
        user: i64,

        /// Write the analytics as JSON to this file instead of the terminal
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Show one section only, as JSON
        #[arg(long, value_enum, default_value_t = AnalyticsView::Full)]
        view: AnalyticsView,
    },

    /// List projects, most recently scanned first
    Projects {
        #[arg(short, long)]
        user: i64,
    },

    /// List scans of a project, newest first
    Scans {
        project_id: i64,

        #[arg(short, long)]
        user: i64,
    },

    /// Print the raw stored result of a scan
    Result {
        scan_id: i64,

        #[arg(short, long)]
        user: i64,

        #[arg(short, long, value_enum, default_value_t = ResultKind::Linter)]
        kind: ResultKind,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum AnalyticsView {
    /// Trend plus every latest-scan breakdown
    Full,
    Trend,
    /// Bugs, vulnerabilities and code smells of the latest scan
    Distribution,
    /// Top analysis service and linter rules of the latest scan
    Rules,
    /// Files with the most analysis service issues in the latest scan
    Files,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ResultKind {
    /// Checkstyle XML written by the linter
    Linter,
    /// Issues JSON fetched from the analysis service
    Service,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = config::Config::load(cli.config.as_deref())?;

    let store = Arc::new(SqliteStore::connect(&config.database.url).await?);

    match cli.command {
        Command::Scan { repo_url, user } => {
            let service = Arc::new(SonarClient::new(&config.service)?);
            let runtime = Arc::new(DockerCli::new(&config.executor));
            let executor = ScanExecutor::new(runtime, service, &config);
            let orchestrator = ScanOrchestrator::new(store.clone(), executor);

            let span = info_span!("scan_command", user, repo_url = %repo_url);
            let outcome = orchestrator.run_scan(user, &repo_url).instrument(span).await?;

            println!(
                "{} scan #{} of project #{}",
                "Completed".green().bold(),
                outcome.scan_id,
                outcome.project_id
            );
            match outcome.linter {
                Some(counts) => println!(
                    "  linter:  {} issues ({} errors, {} warnings, {} info)",
                    counts.total(),
                    counts.error_issues,
                    counts.warning_issues,
                    counts.info_issues
                ),
                None => println!("  linter:  {}", "no result".yellow()),
            }
            match outcome.service {
                Some(metrics) => println!(
                    "  service: {} issues, {} lines of code",
                    metrics.total_issues(),
                    metrics.lines_of_code
                ),
                None => println!("  service: {}", "no result".yellow()),
            }

            let scan = store.get_scan(user, outcome.scan_id).await?;
            println!(
                "  started {}, {} lines of code, maintainability rating {}, cognitive complexity {}",
                scan.started_at.format("%Y-%m-%d %H:%M:%S"),
                scan.lines_of_code,
                scan.maintainability_rating,
                scan.cognitive_complexity
            );
        }

        Command::Analytics {
            project_id,
            user,
            output,
            view,
        } => {
            let aggregator = Analytics::new(store);
            let output = output.as_deref();
            match view {
                AnalyticsView::Full => {
                    let result = aggregator.project(user, project_id).await?;
                    analytics::output::output(&result, output)?;
                }
                AnalyticsView::Trend => {
                    let trend = aggregator.trend(user, project_id).await?;
                    analytics::output::output_section(&trend, output)?;
                }
                AnalyticsView::Distribution => {
                    let dist = aggregator.latest_distribution(user, project_id).await?;
                    analytics::output::output_section(&dist, output)?;
                }
                AnalyticsView::Rules => {
                    let rankings = aggregator.latest_rule_rankings(user, project_id).await?;
                    analytics::output::output_section(&rankings, output)?;
                }
                AnalyticsView::Files => {
                    let files = aggregator.latest_noisy_files(user, project_id).await?;
                    analytics::output::output_section(&files, output)?;
                }
            }
        }

        Command::Projects { user } => {
            let projects = store.list_projects(user).await?;
            if projects.is_empty() {
                println!("No projects.");
            }
            for project in projects {
                let last = project
                    .last_scan
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "#{:<5} {:<24} {:<17} {}",
                    project.id,
                    project.name.bold(),
                    last,
                    project.url
                );
            }
        }

        Command::Scans { project_id, user } => {
            let scans = store.list_project_scans(user, project_id).await?;
            if scans.is_empty() {
                println!("No scans.");
            }
            for scan in scans {
                println!(
                    "#{:<5} {}  linter {:>5}  service {:>5}",
                    scan.id,
                    scan.started_at.format("%Y-%m-%d %H:%M:%S"),
                    scan.linter_issue_count,
                    scan.service_issue_count
                );
            }
        }

        Command::Result {
            scan_id,
            user,
            kind,
        } => {
            let raw = match kind {
                ResultKind::Linter => store.linter_report(user, scan_id).await?,
                ResultKind::Service => store.service_issues(user, scan_id).await?,
            };
            println!("{raw}");
        }
    }

    info!("done");
    Ok(())
}
