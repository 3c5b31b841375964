use super::Host;
use super::common::{CommonArgs, Session, languages};
use super::stage_lock::acquire_stage_lock;
use crate::Result;
use crate::cas::CommandGenerator;
use crate::model::Language;
use crate::pipeline::{CounterSnapshot, StageName, StageOptions, StopFlag, run_stage};
use crate::stages::{CommitStage, ContentStage, MetadataStage, ReleasesStage, SbomStage, TreeStage};
use clap::Parser;
use ohno::bail;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

const LOG_TARGET: &str = "    enrich";

#[derive(Parser, Debug)]
pub struct StageArgs {
    /// Language to process (default is every language with input)
    #[arg(long, short = 'l', value_name = "LANGUAGE")]
    pub language: Option<Language>,

    /// Records processed concurrently (default from configuration)
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Reprocess every record, discarding this stage's existing output
    #[arg(long)]
    pub force: bool,

    /// Process at most this many new records per language
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Run one enrichment stage over each selected language.
pub async fn enrich<H: Host>(host: &mut H, stage: StageName, args: &StageArgs) -> Result<()> {
    let Some(input_stage) = stage.input() else {
        bail!("'{stage}' is not an enrichment stage");
    };

    let session = Session::new(&args.common)?;
    let workers = args.workers.unwrap_or(session.config.workers);
    if workers == 0 {
        bail!("--workers must be at least 1");
    }
    let options = StageOptions {
        workers,
        force: args.force,
        limit: args.limit,
    };

    if matches!(stage, StageName::Metadata | StageName::Releases | StageName::Commit) {
        session.preflight().await?;
    }

    let stop = StopFlag::on_ctrl_c();
    for language in languages(args.language) {
        if stop.is_stopped() {
            break;
        }

        let input = input_stage.file(&session.data_dir, language);
        if !input.is_file() {
            log::info!(target: LOG_TARGET, "No {input_stage} output for {language} at '{}', skipping", input.display());
            if args.language.is_some() {
                let _ = writeln!(
                    host.error(),
                    "No {input_stage} output for {language} at '{}'; run `repo-harvest {input_stage} -l {language}` first",
                    input.display()
                );
            }
            continue;
        }

        let output = stage.file(&session.data_dir, language);
        let _lock = acquire_stage_lock(&output)?;
        let snapshot = run_one(&session, stage, language, &input, &output, options, &stop).await?;

        let _ = writeln!(host.output(), "{stage} {language}: {snapshot} -> {}", output.display());
    }

    Ok(())
}

async fn run_one(
    session: &Session,
    stage: StageName,
    language: Language,
    input: &Path,
    output: &Path,
    options: StageOptions,
    stop: &StopFlag,
) -> Result<CounterSnapshot> {
    let data_dir = session.data_dir.clone();
    match stage {
        StageName::Search => bail!("search is not an enrichment stage"),
        StageName::Metadata => run_stage(Arc::new(MetadataStage::new(session.gateway()?)), input, output, options, stop).await,
        StageName::Releases => {
            let transform = ReleasesStage::new(session.gateway()?, session.ref_resolver()?);
            run_stage(Arc::new(transform), input, output, options, stop).await
        }
        StageName::Commit => {
            let transform = CommitStage::new(session.gateway()?, session.ref_resolver()?);
            run_stage(Arc::new(transform), input, output, options, stop).await
        }
        StageName::Tree => {
            let transform = TreeStage::new(session.tree_resolver()?, data_dir, language);
            run_stage(Arc::new(transform), input, output, options, stop).await
        }
        StageName::Content => {
            let transform = ContentStage::new(Arc::new(session.raw_http()?), &session.config.raw_base_url, data_dir, language);
            run_stage(Arc::new(transform), input, output, options, stop).await
        }
        StageName::Sbom => {
            let generator = CommandGenerator::new(session.config.sbom_command.clone(), session.config.sbom_timeout)?;
            let transform = SbomStage::new(session.content_cache(), generator, data_dir, language, options.force);
            run_stage(Arc::new(transform), input, output, options, stop).await
        }
    }
}
