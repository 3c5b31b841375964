use super::Host;
use super::common::{CommonArgs, Session, languages};
use super::stage_lock::acquire_stage_lock;
use crate::Result;
use crate::model::Language;
use crate::pipeline::{DedupStore, StageName, StopFlag};
use crate::search::{GatewaySearch, SearchCrawler};
use chrono::Utc;
use clap::Parser;
use std::io::Write;

#[derive(Parser, Debug)]
pub struct SearchArgs {
    /// Language to crawl (default is every supported language)
    #[arg(long, short = 'l', value_name = "LANGUAGE")]
    pub language: Option<Language>,

    /// Only collect repositories with at least this many stars (default from configuration)
    #[arg(long, value_name = "N")]
    pub min_stars: Option<u64>,

    /// Discard the existing search output and crawl from scratch
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn search<H: Host>(host: &mut H, args: &SearchArgs) -> Result<()> {
    let session = Session::new(&args.common)?;
    session.preflight().await?;

    let source = GatewaySearch::new(session.gateway()?);
    let min_stars = args.min_stars.unwrap_or(session.config.min_stars);
    let stop = StopFlag::on_ctrl_c();

    for language in languages(args.language) {
        if stop.is_stopped() {
            break;
        }

        let output = StageName::Search.file(&session.data_dir, language);
        let _lock = acquire_stage_lock(&output)?;
        let store = if args.force {
            DedupStore::open_truncated(&output)?
        } else {
            DedupStore::open(&output)?
        };

        let stats = SearchCrawler::new(&source, &store, language, Utc::now(), stop.clone())
            .crawl(min_stars)
            .await?;

        let _ = writeln!(host.output(), "search {language}: {stats} -> {}", output.display());
    }

    Ok(())
}
