//! Event input reader.
//!
//! Reads JSON-lines event records from a file or stdin. Blank lines and
//! `#` comments are ignored.

use crate::models::InputRecord;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::warn;

/// Outcome of parsing one input line.
#[derive(Debug)]
pub enum ParsedLine {
    Record(InputRecord),
    Skipped,
    Invalid { line: usize, error: String },
}

/// Streaming reader over JSON-lines input.
pub struct EventReader {
    lines: tokio::io::Lines<Box<dyn AsyncBufRead + Unpin + Send>>,
    line_number: usize,
    /// Fail on malformed lines instead of skipping them.
    strict: bool,
    skipped: usize,
}

impl EventReader {
    /// Open `path`, or stdin when `path` is `-`.
    pub async fn open(path: &Path, strict: bool) -> Result<Self> {
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = if path == Path::new("-") {
            Box::new(BufReader::new(tokio::io::stdin()))
        } else {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input: {}", path.display()))?;
            Box::new(BufReader::new(file))
        };
        Ok(Self::from_reader(reader, strict))
    }

    pub fn from_reader(reader: Box<dyn AsyncBufRead + Unpin + Send>, strict: bool) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
            strict,
            skipped: 0,
        }
    }

    /// Number of malformed lines skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Next valid record, or `None` at end of input.
    pub async fn next_record(&mut self) -> Result<Option<InputRecord>> {
        while let Some(line) = self.lines.next_line().await.context("Failed to read input")? {
            self.line_number += 1;
            match parse_line(&line, self.line_number) {
                ParsedLine::Record(record) => return Ok(Some(record)),
                ParsedLine::Skipped => continue,
                ParsedLine::Invalid { line, error } => {
                    if self.strict {
                        anyhow::bail!("Invalid event on line {}: {}", line, error);
                    }
                    warn!("Skipping invalid event on line {}: {}", line, error);
                    self.skipped += 1;
                }
            }
        }
        Ok(None)
    }
}

/// Parse a single input line.
pub fn parse_line(line: &str, line_number: usize) -> ParsedLine {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return ParsedLine::Skipped;
    }

    match serde_json::from_str::<InputRecord>(line) {
        Ok(record) if record.event_type.trim().is_empty() => ParsedLine::Invalid {
            line: line_number,
            error: "event type is empty".to_string(),
        },
        Ok(record) => ParsedLine::Record(record),
        Err(e) => ParsedLine::Invalid {
            line: line_number,
            error: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(text: &'static str, strict: bool) -> EventReader {
        EventReader::from_reader(Box::new(BufReader::new(text.as_bytes())), strict)
    }

    #[test]
    fn test_parse_line_variants() {
        assert!(matches!(parse_line("   ", 1), ParsedLine::Skipped));
        assert!(matches!(parse_line("# comment", 2), ParsedLine::Skipped));
        assert!(matches!(
            parse_line(r#"{"type": "click", "subject": "u1"}"#, 3),
            ParsedLine::Record(_)
        ));
        assert!(matches!(
            parse_line("{not json", 4),
            ParsedLine::Invalid { line: 4, .. }
        ));
        assert!(matches!(
            parse_line(r#"{"type": "", "subject": "u1"}"#, 5),
            ParsedLine::Invalid { line: 5, .. }
        ));
    }

    #[tokio::test]
    async fn test_reader_skips_bad_lines() {
        let mut r = reader(
            "{\"type\": \"a\", \"subject\": \"u1\"}\n\
             garbage\n\
             \n\
             {\"type\": \"b\", \"subject\": \"u2\", \"properties\": {\"n\": 1}}\n",
            false,
        );

        let first = r.next_record().await.unwrap().unwrap();
        assert_eq!(first.event_type, "a");
        let second = r.next_record().await.unwrap().unwrap();
        assert_eq!(second.event_type, "b");
        assert_eq!(second.properties["n"], 1);
        assert!(r.next_record().await.unwrap().is_none());
        assert_eq!(r.skipped(), 1);
    }

    #[tokio::test]
    async fn test_strict_reader_fails() {
        let mut r = reader("{\"type\": \"a\", \"subject\": \"u1\"}\nnope\n", true);

        assert!(r.next_record().await.unwrap().is_some());
        let err = r.next_record().await.unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_reads_sample_fixture() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/events.jsonl");
        let mut r = EventReader::open(&path, true).await.unwrap();

        let mut types = Vec::new();
        while let Some(record) = r.next_record().await.unwrap() {
            types.push(record.event_type);
        }
        assert_eq!(
            types,
            vec!["page_view", "signup", "page_view", "purchase", "logout"]
        );
        assert_eq!(r.skipped(), 0);
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let result = EventReader::open(Path::new("/definitely/not/here.jsonl"), false).await;
        assert!(result.is_err());
    }
}
