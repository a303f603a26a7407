//! Output formatting for received rows: text, JSON lines and CSV.

use serde::{Deserialize, Serialize};

use imunode_core::{AlignedRow, FrameAligner};

/// Output format for received rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One human-readable line per frame.
    #[default]
    Text,
    /// One JSON object per row.
    Json,
    /// Gateway CSV: `ms` then six axes per device.
    Csv,
}

/// Formatting options.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    pub format: OutputFormat,
    /// Omit the header line in CSV output.
    pub no_header: bool,
}

impl FormatOptions {
    pub fn new(format: OutputFormat, no_header: bool) -> Self {
        Self { format, no_header }
    }

    /// Header line to print before any row, if the format has one.
    #[must_use]
    pub fn header(&self, aligner: &FrameAligner) -> Option<String> {
        match self.format {
            OutputFormat::Csv if !self.no_header => Some(aligner.csv_header()),
            _ => None,
        }
    }

    /// Format one aligned row.
    #[must_use]
    pub fn row(&self, row: &AlignedRow) -> String {
        match self.format {
            OutputFormat::Text => format_row_text(row),
            OutputFormat::Json => format_row_json(row),
            OutputFormat::Csv => row.to_csv(),
        }
    }
}

/// One line per frame, prefixed by the row time in seconds.
#[must_use]
pub fn format_row_text(row: &AlignedRow) -> String {
    row.frames
        .iter()
        .map(|frame| format!("{:>8.3}s {}", f64::from(row.timestamp_ms) / 1000.0, frame))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compact JSON object.
#[must_use]
pub fn format_row_json(row: &AlignedRow) -> String {
    // AlignedRow only holds numbers, so serialization cannot fail.
    serde_json::to_string(row).unwrap_or_default()
}
