use super::Host;
use super::common::{CommonArgs, Session, languages};
use crate::Result;
use crate::export::{JsonLinesSink, export};
use crate::model::Language;
use crate::pipeline::StageName;
use camino::Utf8PathBuf;
use clap::Parser;
use ohno::IntoAppError;
use std::fs::File;
use std::io::{BufWriter, Write};

const LOG_TARGET: &str = "    export";

#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Stage whose output is exported
    #[arg(long, value_name = "STAGE", default_value = "sbom")]
    pub stage: StageName,

    /// Language to export (default is every language with output)
    #[arg(long, short = 'l', value_name = "LANGUAGE")]
    pub language: Option<Language>,

    /// Records per batch (default from configuration)
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Write JSON lines to this file instead of standard output
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<Utf8PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn export_records<H: Host>(host: &mut H, args: &ExportArgs) -> Result<()> {
    let session = Session::new(&args.common)?;
    let batch_size = args.batch_size.unwrap_or(session.config.export_batch_size);

    let mut file_sink = match &args.output {
        Some(path) => {
            let file = File::create(path).into_app_err_with(|| format!("creating '{path}'"))?;
            Some(JsonLinesSink::new(BufWriter::new(file)))
        }
        None => None,
    };

    for language in languages(args.language) {
        let input = args.stage.file(&session.data_dir, language);
        if !input.is_file() {
            log::debug!(target: LOG_TARGET, "Nothing to export for {language} at '{}'", input.display());
            continue;
        }

        let stats = if let Some(sink) = file_sink.as_mut() {
            export(&input, batch_size, sink).await?
        } else {
            let mut sink = JsonLinesSink::new(Vec::new());
            let stats = export(&input, batch_size, &mut sink).await?;
            host.output().write_all(&sink.into_inner()).into_app_err("writing exported records")?;
            stats
        };

        let _ = writeln!(
            host.error(),
            "export {} {language}: {} record(s) in {} batch(es), {} unreadable line(s)",
            args.stage,
            stats.records,
            stats.batches,
            stats.skipped_lines
        );
    }

    if let Some(sink) = file_sink {
        sink.into_inner().flush().into_app_err("flushing export file")?;
    }
    Ok(())
}
