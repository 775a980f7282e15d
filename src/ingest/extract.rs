//! Rich-document normalization
//!
//! The Files endpoint does not accept office formats, so compound documents
//! are reduced to plain text before upload. Pure Rust extraction, straight
//! from the attachment bytes:
//! - Word: .docx via docx-rs (paragraph, hyperlink and table text only)
//! - Excel: .xlsx, .xls via calamine (cells joined per row)
//!
//! Embedded images, drawings and other media are dropped - only textual
//! content survives normalization.

use calamine::{Reader, Xls, Xlsx};
use std::io::Cursor;

use crate::error::{Error, Result};

/// Maximum text length to extract (to avoid memory issues with huge docs)
const MAX_TEXT_LENGTH: usize = 500_000;

/// Plain text extracted from a rich document
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    /// Derived display name: original name plus a suffix marker
    pub display_name: String,
}

const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const XLS_MIME: &str = "application/vnd.ms-excel";

/// Rich-document format recognized by extension or declared media type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RichFormat {
    Docx,
    Xlsx,
    Xls,
}

impl RichFormat {
    fn detect(name: &str, mime: &str) -> Option<Self> {
        match extension_of(name).as_deref() {
            Some("docx") => return Some(Self::Docx),
            Some("xlsx") => return Some(Self::Xlsx),
            Some("xls") => return Some(Self::Xls),
            _ => {}
        }
        match mime {
            DOCX_MIME => Some(Self::Docx),
            XLSX_MIME => Some(Self::Xlsx),
            XLS_MIME => Some(Self::Xls),
            _ => None,
        }
    }
}

/// True if the attachment's extension or declared media type marks a
/// rich-document format that must be normalized before upload
pub fn needs_normalization(name: &str, mime: &str) -> bool {
    RichFormat::detect(name, mime).is_some()
}

fn extension_of(name: &str) -> Option<String> {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
}

/// Derived name for a normalized payload: `report.docx` -> `report.docx_extracted.txt`
pub fn derived_name(name: &str) -> String {
    format!("{}_extracted.txt", name)
}

/// Extract plain text from a rich document's bytes.
///
/// Fails with an ingestion error (carrying the display name) when the format
/// is unreadable or yields no textual content.
pub fn extract_text(name: &str, mime: &str, bytes: &[u8]) -> Result<ExtractedText> {
    let format = RichFormat::detect(name, mime)
        .ok_or_else(|| Error::ingestion(name, format!("no text extractor for type {}", mime)))?;

    let text = match format {
        RichFormat::Docx => extract_docx(name, bytes)?,
        RichFormat::Xlsx => extract_sheet::<Xlsx<_>>(name, bytes)?,
        RichFormat::Xls => extract_sheet::<Xls<_>>(name, bytes)?,
    };

    let text = clean_text(&text);
    if text.is_empty() {
        return Err(Error::ingestion(name, "document contains no extractable text"));
    }

    let text = truncate_text(&text);
    tracing::info!(
        "[Extract] {} -> {} chars of plain text",
        name,
        text.len()
    );

    Ok(ExtractedText {
        text,
        display_name: derived_name(name),
    })
}

/// Extract text from DOCX using docx-rs
fn extract_docx(name: &str, bytes: &[u8]) -> Result<String> {
    let doc = docx_rs::read_docx(bytes)
        .map_err(|e| Error::ingestion(name, format!("failed to parse DOCX: {}", e)))?;

    let mut all_text = String::new();
    for child in doc.document.children {
        extract_docx_content(&child, &mut all_text);
    }
    Ok(all_text)
}

/// Recursively extract text from DOCX document elements
fn extract_docx_content(element: &docx_rs::DocumentChild, output: &mut String) {
    match element {
        docx_rs::DocumentChild::Paragraph(para) => {
            for child in &para.children {
                match child {
                    docx_rs::ParagraphChild::Run(run) => {
                        push_run_text(run, output);
                    }
                    docx_rs::ParagraphChild::Hyperlink(link) => {
                        for run in &link.children {
                            if let docx_rs::ParagraphChild::Run(r) = run {
                                push_run_text(r, output);
                            }
                        }
                    }
                    _ => {}
                }
            }
            output.push('\n');
        }
        docx_rs::DocumentChild::Table(table) => {
            for row in &table.rows {
                let docx_rs::TableChild::TableRow(tr) = row;
                for cell in &tr.cells {
                    let docx_rs::TableRowChild::TableCell(tc) = cell;
                    for child in &tc.children {
                        if let docx_rs::TableCellContent::Paragraph(para) = child {
                            for p_child in &para.children {
                                if let docx_rs::ParagraphChild::Run(run) = p_child {
                                    push_run_text(run, output);
                                }
                            }
                            output.push_str(" | ");
                        }
                    }
                }
                output.push('\n');
            }
        }
        _ => {}
    }
}

fn push_run_text(run: &docx_rs::Run, output: &mut String) {
    for run_child in &run.children {
        if let docx_rs::RunChild::Text(text) = run_child {
            output.push_str(&text.text);
        }
    }
}

/// Extract text from a spreadsheet using calamine
fn extract_sheet<R>(name: &str, bytes: &[u8]) -> Result<String>
where
    R: Reader<Cursor<Vec<u8>>>,
    R::Error: std::fmt::Display,
{
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook =
        R::new(cursor).map_err(|e| Error::ingestion(name, format!("failed to open sheet: {}", e)))?;

    let mut all_text = String::new();
    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();

    for sheet_name in &sheet_names {
        if let Ok(range) = workbook.worksheet_range(sheet_name) {
            all_text.push_str(&format!("\n=== Sheet: {} ===\n", sheet_name));

            for row in range.rows() {
                let row_text: Vec<String> = row
                    .iter()
                    .map(|cell| cell.to_string())
                    .filter(|s| !s.is_empty())
                    .collect();

                if !row_text.is_empty() {
                    all_text.push_str(&row_text.join(" | "));
                    all_text.push('\n');
                }
            }
        }
    }

    Ok(all_text)
}

/// Clean extracted text
fn clean_text(text: &str) -> String {
    text.lines()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate text to max length, preserving word boundaries
fn truncate_text(text: &str) -> String {
    if text.len() <= MAX_TEXT_LENGTH {
        return text.to_string();
    }

    // The cut point may land inside a multi-byte character; snap back to
    // the nearest char boundary before slicing
    let mut end = MAX_TEXT_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let truncated = &text[..end];

    if let Some(pos) = truncated.rfind("\n\n") {
        return truncated[..pos].to_string();
    }
    if let Some(pos) = truncated.rfind(". ") {
        return truncated[..=pos].to_string();
    }
    if let Some(pos) = truncated.rfind(' ') {
        return truncated[..pos].to_string();
    }

    truncated.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docx_rs::{Docx, Paragraph, Run};

    fn docx_bytes(paragraphs: &[&str]) -> Vec<u8> {
        let mut doc = Docx::new();
        for text in paragraphs {
            doc = doc.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*text)));
        }
        let mut cursor = Cursor::new(Vec::new());
        doc.build().pack(&mut cursor).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_needs_normalization_by_extension() {
        assert!(needs_normalization("report.docx", "application/octet-stream"));
        assert!(needs_normalization("Budget.XLSX", "application/octet-stream"));
        assert!(needs_normalization("legacy.xls", "application/octet-stream"));
        assert!(!needs_normalization("ad.pdf", "application/pdf"));
        assert!(!needs_normalization("copy.txt", "text/plain"));
        assert!(!needs_normalization("noextension", "application/octet-stream"));
    }

    #[test]
    fn test_needs_normalization_by_declared_type() {
        // Office container declared by media type but not by extension
        assert!(needs_normalization("brief.bin", DOCX_MIME));
        assert!(needs_normalization("export", XLSX_MIME));
        assert!(needs_normalization("legacy.dat", XLS_MIME));
        assert!(!needs_normalization("photo.bin", "image/png"));
    }

    #[test]
    fn test_derived_name_keeps_original() {
        assert_eq!(derived_name("report.docx"), "report.docx_extracted.txt");
    }

    #[test]
    fn test_docx_round_trip_is_text_only() {
        let bytes = docx_bytes(&["Limited offer, three days only.", "Buy one get one free."]);
        let extracted = extract_text("promo.docx", DOCX_MIME, &bytes).unwrap();

        assert!(extracted.text.contains("Limited offer"));
        assert!(extracted.text.contains("Buy one get one free"));
        assert_eq!(extracted.display_name, "promo.docx_extracted.txt");
        // Normalized payload is valid UTF-8 text, no binary/image data
        assert!(std::str::from_utf8(extracted.text.as_bytes()).is_ok());
        assert!(!extracted.text.contains('\u{0}'));
    }

    #[test]
    fn test_empty_docx_rejected() {
        let bytes = docx_bytes(&[]);
        let result = extract_text("empty.docx", DOCX_MIME, &bytes);
        assert!(matches!(
            result,
            Err(crate::error::Error::Ingestion { .. })
        ));
    }

    #[test]
    fn test_unknown_format_rejected() {
        let result = extract_text("clip.mp4", "video/mp4", b"not text");
        assert!(result.is_err());
    }

    #[test]
    fn test_docx_by_declared_type_without_extension() {
        let bytes = docx_bytes(&["Fall campaign brief."]);
        let extracted = extract_text("brief.bin", DOCX_MIME, &bytes).unwrap();

        assert!(extracted.text.contains("Fall campaign brief"));
        assert_eq!(extracted.display_name, "brief.bin_extracted.txt");
    }

    #[test]
    fn test_clean_text_drops_blank_lines() {
        let messy = "  Line 1  \n\n  Line 2  \n  \n  Line 3  ";
        assert_eq!(clean_text(messy), "Line 1\nLine 2\nLine 3");
    }

    #[test]
    fn test_truncate_text() {
        let long_text = "a ".repeat(300_000);
        let truncated = truncate_text(&long_text);
        assert!(truncated.len() <= MAX_TEXT_LENGTH);
    }

    #[test]
    fn test_truncate_snaps_to_char_boundary() {
        // 3-byte CJK chars with no spaces or sentence breaks: the cut point
        // lands mid-character and must snap back instead of panicking
        let long_text = "\u{5ee3}".repeat(200_000);
        let truncated = truncate_text(&long_text);

        assert!(truncated.len() <= MAX_TEXT_LENGTH);
        assert!(truncated.chars().all(|c| c == '\u{5ee3}'));
    }

    #[test]
    fn test_oversized_cjk_docx_extracts_without_error() {
        let paragraph = "\u{5ee3}\u{544a}\u{6587}\u{6848}".repeat(50_000);
        let bytes = docx_bytes(&[&paragraph]);

        let extracted = extract_text("campaign.docx", DOCX_MIME, &bytes).unwrap();
        assert!(extracted.text.len() <= MAX_TEXT_LENGTH);
        assert!(extracted.text.starts_with('\u{5ee3}'));
    }
}
