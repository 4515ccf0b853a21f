use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPass {
    /// `ERROR`, exact case.
    ExactError,
    /// `err` in any case.
    AnyCaseErr,
}

impl ScanPass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExactError => "exact_error",
            Self::AnyCaseErr => "any_case_err",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffendingLine {
    pub line_number: usize,
    pub text: String,
    pub pass: ScanPass,
}

/// Reads an entity output log and returns every line carrying a failure
/// keyword.
pub fn scan_output_log(path: &Path) -> Result<Vec<OffendingLine>> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(scan_text(&String::from_utf8_lossy(&bytes)))
}

/// Two passes over `text`: exact `ERROR` first, then `ERR` ignoring case.
/// A line matched by the first pass is not repeated by the second.
#[must_use]
pub fn scan_text(text: &str) -> Vec<OffendingLine> {
    let lines = text.lines().enumerate().collect::<Vec<_>>();

    let mut offending = lines
        .iter()
        .filter(|(_, line)| line.contains("ERROR"))
        .map(|(index, line)| OffendingLine {
            line_number: index + 1,
            text: (*line).to_string(),
            pass: ScanPass::ExactError,
        })
        .collect::<Vec<_>>();

    let reported = offending
        .iter()
        .map(|line| line.line_number)
        .collect::<Vec<_>>();
    offending.extend(
        lines
            .iter()
            .filter(|(index, line)| {
                !reported.contains(&(index + 1)) && line.to_ascii_lowercase().contains("err")
            })
            .map(|(index, line)| OffendingLine {
                line_number: index + 1,
                text: (*line).to_string(),
                pass: ScanPass::AnyCaseErr,
            }),
    );

    offending
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_narrative_has_no_matches() {
        let text = "2026-02-07 06:00:01 StageLoad started\n\
                    2026-02-07 06:00:02 loaded 120 rows in 1 batches (14 ms)\n";
        assert!(scan_text(text).is_empty());
    }

    #[test]
    fn each_line_is_reported_once_with_its_pass() {
        let text = "ok\nORA-00001 ERROR unique constraint\nstatement err: locked\nfine\nErr again\n";
        let found = scan_text(text);

        assert_eq!(
            found
                .iter()
                .map(|line| (line.line_number, line.pass))
                .collect::<Vec<_>>(),
            vec![
                (2, ScanPass::ExactError),
                (3, ScanPass::AnyCaseErr),
                (5, ScanPass::AnyCaseErr),
            ]
        );
        assert_eq!(found[0].text, "ORA-00001 ERROR unique constraint");
    }

    #[test]
    fn substring_inside_words_counts() {
        let found = scan_text("rows transferred\n");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pass, ScanPass::AnyCaseErr);
    }

    #[test]
    fn missing_log_is_an_error() {
        let path = std::env::temp_dir().join(format!("extract-loader-scan-{}.out", ulid::Ulid::new()));
        assert!(scan_output_log(&path).is_err());
    }
}
