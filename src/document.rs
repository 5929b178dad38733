// WHY: Turns a plain-text interlinear source file into paragraphs of styled text
// Blank lines separate paragraphs; `\c N` and `\v N` markers become chapter and verse label runs

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::store::ParagraphId;
use crate::text::{Paragraph, StyledText, StyledTextBuilder, WsId, CHAPTER_NUMBER_STYLE, VERSE_NUMBER_STYLE};

const CHAPTER_MARKER: &str = "\\c";
const VERSE_MARKER: &str = "\\v";

/// Reading behavior for source files
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    /// Writing system of every run
    pub ws: WsId,
    pub buffer_size: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self { ws: WsId(1), buffer_size: 8192 }
    }
}

/// A loaded source file
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub paragraphs: Vec<Paragraph>,
    pub lines_read: u64,
}

impl Document {
    /// Total length in UTF-16 code units
    pub fn text_len(&self) -> usize {
        self.paragraphs.iter().map(|p| p.text.len()).sum()
    }
}

/// Read and split a UTF-8 file with the default configuration
pub async fn load_document<P: AsRef<Path>>(path: P) -> Result<Document> {
    load_document_with(path, &DocumentConfig::default()).await
}

pub async fn load_document_with<P: AsRef<Path>>(path: P, config: &DocumentConfig) -> Result<Document> {
    let path = path.as_ref();
    debug!("Starting async read of document: {}", path.display());
    let file = File::open(path).await.with_context(|| format!("Failed to open document {}", path.display()))?;
    let mut lines = BufReader::with_capacity(config.buffer_size, file).lines();

    let mut collected = Vec::new();
    while let Some(line) = lines
        .next_line()
        .await
        .with_context(|| format!("Failed to read document {} (is it UTF-8?)", path.display()))?
    {
        collected.push(line);
    }
    let lines_read = collected.len() as u64;
    let paragraphs = split_paragraphs(collected.iter().map(String::as_str), config.ws);
    info!(path = %path.display(), lines_read, paragraphs = paragraphs.len(), "Document loaded");
    Ok(Document { path: path.to_path_buf(), paragraphs, lines_read })
}

/// Split lines into paragraphs numbered from 1; lines within a paragraph are joined by a space
pub fn split_paragraphs<'l>(lines: impl IntoIterator<Item = &'l str>, ws: WsId) -> Vec<Paragraph> {
    let mut paragraphs = Vec::new();
    let mut current: Option<StyledTextBuilder> = None;
    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            if let Some(builder) = current.take() {
                paragraphs.push(finish(builder, paragraphs.len()));
            }
            continue;
        }
        let builder = match current.take() {
            Some(builder) => builder.run(" ", ws),
            None => StyledText::builder(),
        };
        current = Some(append_line(builder, line.trim(), ws));
    }
    if let Some(builder) = current {
        paragraphs.push(finish(builder, paragraphs.len()));
    }
    paragraphs
}

fn finish(builder: StyledTextBuilder, index: usize) -> Paragraph {
    Paragraph::new(ParagraphId(index as u64 + 1), builder.build())
}

/// One source line, with any leading chapter/verse markers turned into label runs
fn append_line(mut builder: StyledTextBuilder, line: &str, ws: WsId) -> StyledTextBuilder {
    let mut rest = line;
    loop {
        let style = if let Some(after) = strip_marker(rest, CHAPTER_MARKER) {
            rest = after;
            CHAPTER_NUMBER_STYLE
        } else if let Some(after) = strip_marker(rest, VERSE_MARKER) {
            rest = after;
            VERSE_NUMBER_STYLE
        } else {
            break;
        };
        let trimmed = rest.trim_start();
        let number_len = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        let (number, tail) = trimmed.split_at(number_len);
        if !number.is_empty() {
            builder = builder.styled_run(number, ws, style);
        }
        rest = tail;
        if rest.trim_start().starts_with('\\') {
            // Consecutive markers: keep the separating space as plain text
            builder = builder.run(" ", ws);
            rest = rest.trim_start();
        }
    }
    if rest.is_empty() {
        builder
    } else {
        builder.run(rest, ws)
    }
}

/// Text after `marker` when it stands alone, followed by whitespace or its number
fn strip_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let after = line.strip_prefix(marker)?;
    after.starts_with(|c: char| c.is_whitespace() || c.is_ascii_digit()).then_some(after)
}
