//! Result Exporter
//!
//! Deterministic line-oriented markdown -> .docx transform. Heading markers
//! become document headings, bullet markers become bulleted paragraphs,
//! everything else becomes a plain paragraph with bold/italic markers
//! stripped. Blank lines are dropped. Lossy and one-way: there is no
//! round-trip guarantee back to markdown, and the input has no strict
//! grammar - the generated report can be any markdown shape.

use docx_rs::{
    AbstractNumbering, Docx, IndentLevel, Level, LevelJc, LevelText, NumberFormat, Numbering,
    NumberingId, Paragraph, Run, Start, Style, StyleType,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;

use crate::error::{Error, Result};
use crate::pipeline::Stage;

/// Bold/italic markers removed (not rendered) from plain text
static EMPHASIS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*|\*|__").expect("invalid emphasis regex"));

/// Single-underscore italics; the word boundaries spare interior
/// underscores such as snake_case identifiers
static UNDERSCORE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b_([^_]+)_\b").expect("invalid underscore regex"));

const BULLET_NUMBERING_ID: usize = 1;

/// Intermediate document representation, pure and unit-testable; the docx
/// serialization below is a thin rendering layer over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocBlock {
    Heading { level: u8, text: String },
    Bullet(String),
    Paragraph(String),
}

/// Split markdown into document blocks, one per non-blank line
pub fn parse_markdown(markdown: &str) -> Vec<DocBlock> {
    let mut blocks = Vec::new();

    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(rest) = heading_text(trimmed) {
            let hashes = trimmed.len() - trimmed.trim_start_matches('#').len();
            blocks.push(DocBlock::Heading {
                // Deeper markdown levels clamp to the last defined heading style
                level: hashes.min(3) as u8,
                text: strip_emphasis(rest),
            });
        } else if let Some(rest) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* "))
        {
            blocks.push(DocBlock::Bullet(strip_emphasis(rest.trim())));
        } else {
            blocks.push(DocBlock::Paragraph(strip_emphasis(trimmed)));
        }
    }

    blocks
}

fn heading_text(line: &str) -> Option<&str> {
    let stripped = line.trim_start_matches('#');
    if stripped.len() == line.len() {
        return None;
    }
    stripped.strip_prefix(' ').map(str::trim)
}

fn strip_emphasis(text: &str) -> String {
    let text = EMPHASIS_RE.replace_all(text, "");
    UNDERSCORE_RE.replace_all(&text, "$1").to_string()
}

/// Render blocks into .docx bytes
pub fn to_docx(blocks: &[DocBlock]) -> Result<Vec<u8>> {
    let mut docx = Docx::new()
        .add_style(heading_style("Heading1", "Heading 1", 32))
        .add_style(heading_style("Heading2", "Heading 2", 28))
        .add_style(heading_style("Heading3", "Heading 3", 24))
        .add_abstract_numbering(AbstractNumbering::new(BULLET_NUMBERING_ID).add_level(
            Level::new(
                0,
                Start::new(1),
                NumberFormat::new("bullet"),
                LevelText::new("\u{2022}"),
                LevelJc::new("left"),
            ),
        ))
        .add_numbering(Numbering::new(BULLET_NUMBERING_ID, BULLET_NUMBERING_ID));

    for block in blocks {
        let paragraph = match block {
            DocBlock::Heading { level, text } => Paragraph::new()
                .add_run(Run::new().add_text(text.as_str()))
                .style(&format!("Heading{}", level)),
            DocBlock::Bullet(text) => Paragraph::new()
                .add_run(Run::new().add_text(text.as_str()))
                .numbering(NumberingId::new(BULLET_NUMBERING_ID), IndentLevel::new(0)),
            DocBlock::Paragraph(text) => {
                Paragraph::new().add_run(Run::new().add_text(text.as_str()))
            }
        };
        docx = docx.add_paragraph(paragraph);
    }

    let mut cursor = Cursor::new(Vec::new());
    docx.build()
        .pack(&mut cursor)
        .map_err(|e| Error::Export(format!("failed to pack docx: {}", e)))?;
    Ok(cursor.into_inner())
}

fn heading_style(id: &str, name: &str, half_points: usize) -> Style {
    Style::new(id, StyleType::Paragraph)
        .name(name)
        .size(half_points)
        .bold()
}

/// Serialize a stage's markdown result into a portable .docx byte stream
pub fn export_markdown(markdown: &str) -> Result<Vec<u8>> {
    let blocks = parse_markdown(markdown);
    tracing::debug!("[Export] {} blocks from {} chars", blocks.len(), markdown.len());
    to_docx(&blocks)
}

/// Download filename convention: `Step{N}_<Label>.docx`
pub fn export_filename(stage: Stage) -> String {
    format!("Step{}_{}.docx", stage.number(), stage.export_label())
}
