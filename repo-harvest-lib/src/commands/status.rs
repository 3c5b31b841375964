use super::Host;
use super::common::{CommonArgs, Session, languages};
use crate::Result;
use crate::model::Language;
use crate::pipeline::{StageName, count_records};
use clap::Parser;
use std::io::Write;
use strum::IntoEnumIterator;

const COLUMN_WIDTH: usize = 10;

#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Language to report (default is every supported language)
    #[arg(long, short = 'l', value_name = "LANGUAGE")]
    pub language: Option<Language>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Print how many records each stage file holds, one row per language.
pub fn status<H: Host>(host: &mut H, args: &StatusArgs) -> Result<()> {
    let session = Session::new(&args.common)?;

    let mut out = String::new();
    out.push_str(&format!("{:<COLUMN_WIDTH$}", "language"));
    for stage in StageName::iter() {
        out.push_str(&format!("{:>COLUMN_WIDTH$}", stage.to_string()));
    }
    out.push('\n');

    for language in languages(args.language) {
        out.push_str(&format!("{:<COLUMN_WIDTH$}", language.to_string()));
        for stage in StageName::iter() {
            let cell = count_records(&stage.file(&session.data_dir, language))?.map_or_else(|| "-".to_string(), |n| n.to_string());
            out.push_str(&format!("{cell:>COLUMN_WIDTH$}"));
        }
        out.push('\n');
    }

    let _ = write!(host.output(), "{out}");
    Ok(())
}
