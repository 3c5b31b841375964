//! Command dispatch logic for repo-harvest

use super::common::{CommonArgs, TOKEN_HINT};
use super::{ExportArgs, SearchArgs, StageArgs, StatusArgs, enrich, export_records, search, status};
use crate::pipeline::StageName;
use crate::{Host, Result};
use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};
use std::io::Write;

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "repo-harvest", author, version, long_about = None)]
#[command(about = "Discover GitHub repositories and enrich them through a resumable pipeline")]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: HarvestSubcommand,
}

#[derive(Subcommand, Debug)]
enum HarvestSubcommand {
    /// Collect every repository of a language above a star threshold
    Search(Box<SearchArgs>),
    /// Refresh repository metadata
    Metadata(Box<StageArgs>),
    /// Collect recent releases, falling back to tags
    Releases(Box<StageArgs>),
    /// Pin each repository to a commit
    Commit(Box<StageArgs>),
    /// List the files of each pinned commit
    Tree(Box<StageArgs>),
    /// Download dependency manifests at each pinned commit
    Content(Box<StageArgs>),
    /// Derive an SBOM from the downloaded manifests
    Sbom(Box<StageArgs>),
    /// Show how many records each stage holds
    Status(Box<StatusArgs>),
    /// Hand a stage's records to the analytical store as JSON lines
    Export(Box<ExportArgs>),
}

impl HarvestSubcommand {
    fn common(&self) -> &CommonArgs {
        match self {
            Self::Search(args) => &args.common,
            Self::Metadata(args) | Self::Releases(args) | Self::Commit(args) | Self::Tree(args) | Self::Content(args) | Self::Sbom(args) => {
                &args.common
            }
            Self::Status(args) => &args.common,
            Self::Export(args) => &args.common,
        }
    }

    /// Whether the command spends API quota.
    const fn uses_api(&self) -> bool {
        matches!(self, Self::Search(_) | Self::Metadata(_) | Self::Releases(_) | Self::Commit(_))
    }
}

/// Dispatch command-line arguments to the appropriate handler
///
/// Failures are reported on the host's error stream with their full context, followed by a
/// remediation hint where one applies, and the host is asked to exit with status 1.
pub async fn run<I, T, H>(host: &mut H, args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
    H: Host,
{
    let cli = Cli::parse_from(args);

    let result = match &cli.command {
        HarvestSubcommand::Search(args) => search(host, args).await,
        HarvestSubcommand::Metadata(args) => enrich(host, StageName::Metadata, args).await,
        HarvestSubcommand::Releases(args) => enrich(host, StageName::Releases, args).await,
        HarvestSubcommand::Commit(args) => enrich(host, StageName::Commit, args).await,
        HarvestSubcommand::Tree(args) => enrich(host, StageName::Tree, args).await,
        HarvestSubcommand::Content(args) => enrich(host, StageName::Content, args).await,
        HarvestSubcommand::Sbom(args) => enrich(host, StageName::Sbom, args).await,
        HarvestSubcommand::Status(args) => status(host, args),
        HarvestSubcommand::Export(args) => export_records(host, args).await,
    };

    if let Err(e) = &result {
        let _ = writeln!(host.error(), "error: {e:#}");
        let token_missing = cli.command.common().github_token.as_deref().is_none_or(|t| t.trim().is_empty());
        if cli.command.uses_api() && token_missing {
            let _ = writeln!(host.error(), "{TOKEN_HINT}");
        }
        host.exit(1);
    }

    result
}
