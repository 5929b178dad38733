use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::info;

use interlin::store::MemoryLexicon;
use interlin::{
    load_document, Document, MemoryRegistry, MemoryStore, ParseOptions, ParseOutcome, ParseReport, ReconcilerConfig, Session,
};

/// Paragraphs handed to one parse call; leftover reuse works within a call
const PARAGRAPHS_PER_PARSE: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "interlin")]
#[command(about = "Tokenize interlinear text and reconcile it with existing annotations")]
#[command(version)]
struct Args {
    /// Source text; blank lines separate paragraphs, \c and \v mark chapter and verse numbers
    file: PathBuf,

    /// Edited version of the source, reparsed in a second session against the same store
    #[arg(long)]
    edited: Option<PathBuf>,

    /// Persist wordforms, occurrences and segments instead of creating dummies
    #[arg(long)]
    real: bool,

    /// JSON file with parse options
    #[arg(long)]
    options: Option<PathBuf>,

    /// JSON file with engine configuration (drift threshold, strictness, ...)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Citation forms, one per line; enables best-guess analyses
    #[arg(long)]
    lexicon: Option<PathBuf>,

    /// Suppress console progress bars
    #[arg(long)]
    no_progress: bool,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // WHY: logs go to stderr so stdout carries only the report
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let args = Args::parse();
    info!(?args, "Parsed CLI arguments");

    if !args.file.is_file() {
        anyhow::bail!("Source file does not exist: {}", args.file.display());
    }

    let mut options: ParseOptions = match &args.options {
        Some(path) => read_json(path).await?,
        None => ParseOptions::default(),
    };
    if args.real {
        options = ParseOptions { guess_analyses: options.guess_analyses, ..ParseOptions::real() };
    }
    let config: ReconcilerConfig = match &args.config {
        Some(path) => read_json(path).await?,
        None => ReconcilerConfig::default(),
    };
    let lexicon = match &args.lexicon {
        Some(path) => {
            options.guess_analyses = true;
            Some(read_lexicon(path).await?)
        }
        None => None,
    };

    let mut store = MemoryStore::new();
    let mut registry = MemoryRegistry::new();

    let document = load_document(&args.file).await?;
    let first = run_pass(&mut store, &mut registry, lexicon.as_ref(), &document, &options, &config, !args.no_progress)?;
    let mut reports = vec![first];

    if let Some(edited) = &args.edited {
        let edited = load_document(edited).await?;
        store.reset_counters();
        let second = run_pass(&mut store, &mut registry, lexicon.as_ref(), &edited, &options, &config, !args.no_progress)?;
        let before: HashSet<_> = reports[0].identities().into_iter().collect();
        let after = second.identities();
        let kept = after.iter().filter(|id| before.contains(id)).count();
        info!(kept, total = after.len(), "Identities carried over to the edited text");
        reports.push(second);
    }

    let json = if reports.len() == 1 {
        reports[0].to_json(args.pretty)?
    } else if args.pretty {
        serde_json::to_string_pretty(&reports)?
    } else {
        serde_json::to_string(&reports)?
    };
    println!("{json}");
    Ok(())
}

fn run_pass(
    store: &mut MemoryStore,
    registry: &mut MemoryRegistry,
    lexicon: Option<&MemoryLexicon>,
    document: &Document,
    options: &ParseOptions,
    config: &ReconcilerConfig,
    show_progress: bool,
) -> Result<ParseReport> {
    let mut session = Session::with_config(store, registry, config.clone())?;
    if let Some(lexicon) = lexicon {
        session = session.with_lexicon(lexicon);
    }

    let bar = if show_progress {
        let bar = ProgressBar::new(document.paragraphs.len() as u64);
        bar.set_style(ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} paragraphs")?);
        bar
    } else {
        ProgressBar::hidden()
    };

    let mut outcome = ParseOutcome::default();
    for chunk in document.paragraphs.chunks(PARAGRAPHS_PER_PARSE) {
        let result = session
            .parse(chunk, options)
            .with_context(|| format!("Failed to parse {}", document.path.display()))?;
        outcome.success = result.success;
        outcome.did_parse |= result.did_parse;
        outcome.partial |= result.partial;
        outcome.paragraphs += result.paragraphs;
        outcome.matches += result.matches;
        bar.inc(chunk.len() as u64);
    }
    bar.finish_and_clear();

    let stats = session.stats().clone();
    session.end();
    drop(session);

    info!(path = %document.path.display(), paragraphs = outcome.paragraphs, "Pass complete");
    let source = document.path.display().to_string();
    Ok(ParseReport::collect(source, outcome, stats, &*store, &*registry, &document.paragraphs).with_counters(store.counters().clone()))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

async fn read_lexicon(path: &Path) -> Result<MemoryLexicon> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read lexicon {}", path.display()))?;
    let mut lexicon = MemoryLexicon::new();
    for form in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        lexicon.add_entry(form, interlin::WsId(1));
    }
    Ok(lexicon)
}
