//! Fixparity - release-train fix-parity monitor.
//!
//! Pulls issue records from a remote tracker and reports which fixes exist
//! in one release train but not the other.
//!
//! ## Commands
//!
//! - `parity`: parity report for one major release train
//! - `issues`: list resolved issues for a query
//! - `backports`: show the backport map for a query

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};

use fixparity_core::{
    init_tracing, BackportResolver, ExclusionRules, Fidelity, IssueCache, ParityClassifier,
    ParityModel, RestTrackerClient, TrainSpec,
};

mod config;
mod render;

use render::{CsvRenderer, ReportRenderer, TextRenderer};

#[derive(Parser)]
#[command(name = "fixparity")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Release-train fix-parity monitor", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML file with tracker settings (url, user, token)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report fix parity between the open and vendor trains of one major release
    Parity {
        /// Major release train identifier
        #[arg(long)]
        major: u32,

        /// Tracker project the train lives in
        #[arg(long, default_value = "JDK")]
        project: String,

        /// Train version to account for (repeatable)
        #[arg(long = "release")]
        releases: Vec<String>,

        /// File with one train version per line ('#' starts a comment)
        #[arg(long)]
        releases_file: Option<PathBuf>,

        /// Include the both-trains relative-order breakdown
        #[arg(long)]
        verbose_report: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: Format,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List resolved issues for a query
    Issues {
        /// Opaque tracker query expression
        #[arg(long)]
        query: String,

        /// Fetch full records instead of basic ones
        #[arg(long)]
        full: bool,
    },

    /// Show the backport map for a query
    Backports {
        /// Opaque tracker query expression
        #[arg(long)]
        query: String,

        /// Include each root in its own backport set
        #[arg(long)]
        include_root: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let tracker_cfg = config::load(cli.config.as_deref())?;
    let client = Arc::new(RestTrackerClient::new(tracker_cfg));
    let cache = Arc::new(IssueCache::new(client));

    match cli.command {
        Commands::Parity {
            major,
            project,
            releases,
            releases_file,
            verbose_report,
            format,
            output,
        } => {
            let versions = collect_versions(releases, releases_file.as_deref())?;
            if versions.is_empty() {
                bail!("no train versions given; use --release or --releases-file");
            }
            let train = TrainSpec {
                project,
                major,
                versions,
            };

            let model = ParityClassifier::new(cache, ExclusionRules::for_major(major))
                .verbose(verbose_report)
                .classify(&train)
                .await
                .context("parity classification failed")?;

            let renderer: Box<dyn ReportRenderer> = match format {
                Format::Text => Box::new(TextRenderer {
                    verbose: verbose_report,
                }),
                Format::Csv => Box::new(CsvRenderer),
            };
            write_report(renderer.as_ref(), &model, output.as_deref())?;
        }

        Commands::Issues { query, full } => {
            let fidelity = if full { Fidelity::Full } else { Fidelity::Basic };
            let issues = cache
                .issues(&query, fidelity)
                .await
                .context("issue enumeration failed")?;

            let mut out = io::stdout().lock();
            for issue in &issues {
                let fix = issue.fix_version()?.unwrap_or("N/A");
                writeln!(out, "{:<16} {:<14} {}", issue.key, fix, issue.summary)?;
            }
            info!(count = issues.len(), "issues listed");
        }

        Commands::Backports {
            query,
            include_root,
        } => {
            let resolver = BackportResolver::new(cache);
            let map = resolver
                .backport_map(&query, include_root)
                .await
                .context("backport resolution failed")?;

            let mut out = io::stdout().lock();
            for (key, entry) in map.iter() {
                writeln!(out, "{}: {}", key, entry.root().summary)?;
                for member in entry.members() {
                    writeln!(out, "  {:<16} {}", member.key, member.fix_versions.join(","))?;
                }
            }
            info!(roots = map.len(), "backport map printed");
        }
    }

    Ok(())
}

fn collect_versions(releases: Vec<String>, releases_file: Option<&Path>) -> Result<Vec<String>> {
    let mut versions = releases;
    if let Some(path) = releases_file {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading releases file {}", path.display()))?;
        versions.extend(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }
    Ok(versions)
}

fn write_report(
    renderer: &dyn ReportRenderer,
    model: &ParityModel,
    output: Option<&Path>,
) -> Result<()> {
    match output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            renderer.render(model, &mut writer)?;
            writer.flush()?;
            info!(path = %path.display(), "report written");
        }
        None => {
            let mut out = io::stdout().lock();
            renderer.render(model, &mut out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn test_collect_versions_merges_flags_and_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "# train versions\n11.0.10\n\n11.0.11").expect("write");

        let versions = collect_versions(
            vec!["11.0.9".to_string()],
            Some(file.path()),
        )
        .expect("collect");
        assert_eq!(versions, vec!["11.0.9", "11.0.10", "11.0.11"]);
    }

    #[test]
    fn test_collect_versions_missing_file_fails() {
        let err = collect_versions(Vec::new(), Some(Path::new("/nonexistent/vers.txt")))
            .expect_err("missing file");
        assert!(err.to_string().contains("vers.txt"));
    }

    #[test]
    fn test_cli_parses_parity_command() {
        let cli = Cli::try_parse_from([
            "fixparity",
            "parity",
            "--major",
            "11",
            "--release",
            "11.0.9",
            "--format",
            "csv",
        ])
        .expect("parse");
        match cli.command {
            Commands::Parity { major, releases, .. } => {
                assert_eq!(major, 11);
                assert_eq!(releases, vec!["11.0.9"]);
            }
            _ => panic!("expected parity command"),
        }
    }
}
