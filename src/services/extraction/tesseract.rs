// Tesseract CLI backend. The crop is piped in as PNG and word-level TSV is
// read back from stdout.

use async_trait::async_trait;
use image::RgbaImage;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{TextExtraction, TextExtractor};
use crate::core::errors::{ExtractionError, ExtractionResult};
use crate::core::language::Language;
use crate::utils::encode_png;

/// TSV row level for a single word
const WORD_LEVEL: &str = "5";

pub struct TesseractExtractor {
    binary: String,
}

impl TesseractExtractor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, language: Language) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(["stdin", "stdout", "--oem", "1", "--psm", "11", "-l"])
            .arg(language.tesseract_code())
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl TextExtractor for TesseractExtractor {
    fn name(&self) -> &str {
        "tesseract"
    }

    #[instrument(skip(self, crop), fields(width = crop.width(), height = crop.height()))]
    async fn extract(&self, crop: &RgbaImage, language: Language) -> ExtractionResult<TextExtraction> {
        let png = encode_png(crop)?;

        let mut child = self.command(language).spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                ExtractionError::Unavailable(format!("{} not found on PATH", self.binary))
            }
            _ => ExtractionError::Unavailable(e.to_string()),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&png)
                .await
                .map_err(|e| ExtractionError::Unavailable(format!("failed to write image: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExtractionError::Unavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            // Missing traineddata breaks every region, not just this one
            if stderr.contains("Failed loading language") || stderr.contains("Error opening data file") {
                return Err(ExtractionError::Unavailable(stderr));
            }
            return Err(ExtractionError::Unreadable { reason: stderr });
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let extraction = parse_tsv(&tsv, language.is_cjk());
        debug!(
            "Extracted {} chars at confidence {:.1}",
            extraction.text.chars().count(),
            extraction.confidence
        );
        Ok(extraction)
    }
}

/// Join recognized words and average their confidences.
///
/// Rows with a negative confidence are layout rows, not words. CJK words are
/// concatenated, everything else is joined with single spaces.
pub fn parse_tsv(tsv: &str, cjk: bool) -> TextExtraction {
    let mut words: Vec<&str> = Vec::new();
    let mut confidence_sum = 0.0f32;

    for line in tsv.lines().skip(1) {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 12 || columns[0] != WORD_LEVEL {
            continue;
        }
        let Ok(confidence) = columns[10].trim().parse::<f32>() else {
            continue;
        };
        let word = columns[11].trim();
        if confidence < 0.0 || word.is_empty() {
            continue;
        }
        words.push(word);
        confidence_sum += confidence;
    }

    if words.is_empty() {
        return TextExtraction::empty();
    }

    let separator = if cjk { "" } else { " " };
    TextExtraction {
        text: words.join(separator),
        confidence: confidence_sum / words.len() as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    #[test]
    fn test_parse_words_and_confidence() {
        let tsv = format!(
            "{HEADER}\n\
             1\t1\t0\t0\t0\t0\t0\t0\t100\t40\t-1\t\n\
             5\t1\t1\t1\t1\t1\t2\t3\t30\t12\t90.5\tHELLO\n\
             5\t1\t1\t1\t1\t2\t40\t3\t30\t12\t69.5\tWORLD\n\
             5\t1\t1\t1\t1\t3\t80\t3\t5\t12\t95\t \n"
        );
        let out = parse_tsv(&tsv, false);
        assert_eq!(out.text, "HELLO WORLD");
        assert!((out.confidence - 80.0).abs() < 1e-4);
    }

    #[test]
    fn test_parse_cjk_concatenates() {
        let tsv = format!(
            "{HEADER}\n5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t80\tこん\n5\t1\t1\t1\t1\t2\t0\t0\t10\t10\t60\tにちは\n"
        );
        let out = parse_tsv(&tsv, true);
        assert_eq!(out.text, "こんにちは");
        assert!((out.confidence - 70.0).abs() < 1e-4);
    }

    #[test]
    fn test_parse_empty_output() {
        let out = parse_tsv(HEADER, false);
        assert_eq!(out, TextExtraction::empty());
        assert_eq!(parse_tsv("", false), TextExtraction::empty());
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let extractor = TesseractExtractor::new("definitely-not-tesseract-binary");
        let err = extractor
            .extract(&RgbaImage::new(8, 8), Language::English)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Unavailable(_)));
    }
}
