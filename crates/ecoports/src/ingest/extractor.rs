//! PDF text extraction seam.
//!
//! The import flow only ever sees `bytes in, text out`, so the extraction
//! engine can be swapped without touching parsing. The bundled extractor
//! reads literal-string text operators from uncompressed content streams,
//! which covers the report generators we receive documents from; compressed
//! streams and hex-encoded strings are out of its scope and surface as a
//! missing text layer.

use std::fmt::Debug;

/// Narrow interface over PDF-to-text.
pub trait TextExtractor: Debug + Send + Sync {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("file is not a PDF document")]
    NotPdf,
    #[error("no extractable text in document")]
    NoTextLayer,
}

/// Extractor for uncompressed PDFs that show text through `Tj`/`TJ`
/// operators with literal strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        if !bytes.starts_with(b"%PDF-") {
            return Err(ExtractionError::NotPdf);
        }

        let mut text = String::new();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'(' => {
                    let (literal, next) = parse_literal(bytes, i);
                    if text_operator_follows(bytes, next) {
                        text.push_str(&literal);
                        text.push('\n');
                    }
                    i = next;
                }
                b'[' => {
                    let (literals, next) = parse_array(bytes, i);
                    if tj_follows(bytes, next) {
                        for literal in &literals {
                            text.push_str(literal);
                        }
                        text.push('\n');
                    }
                    i = next;
                }
                _ => i += 1,
            }
        }

        if text.trim().is_empty() {
            return Err(ExtractionError::NoTextLayer);
        }
        Ok(text)
    }
}

/// Decodes a literal string starting at the opening parenthesis. Returns the
/// decoded text and the index just past the closing parenthesis. Balanced
/// unescaped parentheses nest, per the document syntax.
fn parse_literal(bytes: &[u8], open: usize) -> (String, usize) {
    let mut out = String::new();
    let mut depth = 1usize;
    let mut i = open + 1;

    while i < bytes.len() && depth > 0 {
        match bytes[i] {
            b'\\' if i + 1 < bytes.len() => {
                i += 1;
                match bytes[i] {
                    b'n' => out.push('\n'),
                    b'r' => out.push('\r'),
                    b't' => out.push('\t'),
                    b'b' => out.push('\u{8}'),
                    b'f' => out.push('\u{c}'),
                    b'(' => out.push('('),
                    b')' => out.push(')'),
                    b'\\' => out.push('\\'),
                    digit @ b'0'..=b'7' => {
                        let mut value = u32::from(digit - b'0');
                        let mut consumed = 1;
                        while consumed < 3 {
                            match bytes.get(i + 1) {
                                Some(next @ b'0'..=b'7') => {
                                    value = value * 8 + u32::from(next - b'0');
                                    i += 1;
                                    consumed += 1;
                                }
                                _ => break,
                            }
                        }
                        if let Some(c) = char::from_u32(value) {
                            out.push(c);
                        }
                    }
                    other => out.push(char::from(other)),
                }
                i += 1;
            }
            b'(' => {
                depth += 1;
                out.push('(');
                i += 1;
            }
            b')' => {
                depth -= 1;
                if depth > 0 {
                    out.push(')');
                }
                i += 1;
            }
            other => {
                out.push(char::from(other));
                i += 1;
            }
        }
    }

    (out, i)
}

/// Collects every literal string inside a `[...]` operand. Returns the
/// strings and the index just past the closing bracket.
fn parse_array(bytes: &[u8], open: usize) -> (Vec<String>, usize) {
    let mut literals = Vec::new();
    let mut i = open + 1;

    while i < bytes.len() {
        match bytes[i] {
            b'(' => {
                let (literal, next) = parse_literal(bytes, i);
                literals.push(literal);
                i = next;
            }
            b']' => {
                i += 1;
                break;
            }
            _ => i += 1,
        }
    }

    (literals, i)
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// True when the operand just parsed is consumed by a text-showing operator
/// (`Tj`, `'`, or `"`).
fn text_operator_follows(bytes: &[u8], from: usize) -> bool {
    let i = skip_whitespace(bytes, from);
    match bytes.get(i) {
        Some(b'\'') | Some(b'"') => true,
        Some(b'T') => bytes.get(i + 1) == Some(&b'j'),
        _ => false,
    }
}

fn tj_follows(bytes: &[u8], from: usize) -> bool {
    let i = skip_whitespace(bytes, from);
    bytes.get(i) == Some(&b'T') && bytes.get(i + 1) == Some(&b'J')
}
