// ============================================================
// TEST CASE CSV PARSER
// ============================================================
// Spreadsheet exports of test plans -> NewTestCase rows, in file order

use crate::domain::error::{AppError, Result};
use crate::domain::test_case::{NewTestCase, TestCaseStatus};
use csv::{ReaderBuilder, StringRecord, Trim};
use encoding_rs::WINDOWS_1252;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    TestBed,
    Title,
    Steps,
    Expected,
    Notes,
    Status,
}

impl Column {
    fn from_header(header: &str) -> Option<Self> {
        let key: String = header
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match key.as_str() {
            "testbed" | "bed" | "environment" => Some(Column::TestBed),
            "testcase" | "testcasetitle" | "title" | "testcasename" => Some(Column::Title),
            "teststeps" | "steps" => Some(Column::Steps),
            "expectedresult" | "expected" | "expectedresults" => Some(Column::Expected),
            "notes" | "note" | "comments" => Some(Column::Notes),
            "status" | "result" => Some(Column::Status),
            _ => None,
        }
    }
}

/// Parser for test plans exported from spreadsheets.
#[derive(Debug, Default)]
pub struct CsvParser {
    /// `None` detects the delimiter from the content
    delimiter: Option<u8>,
}

impl CsvParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Decodes raw upload bytes, falling back to Windows-1252 for legacy Excel exports.
    fn decode(bytes: &[u8]) -> String {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        match std::str::from_utf8(bytes) {
            Ok(content) => content.to_string(),
            Err(_) => {
                let (content, _, _) = WINDOWS_1252.decode(bytes);
                content.into_owned()
            }
        }
    }

    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<Vec<NewTestCase>> {
        self.parse_content(&Self::decode(bytes))
    }

    /// Parses CSV text. Rows keep file order; rows without a title are skipped.
    pub fn parse_content(&self, content: &str) -> Result<Vec<NewTestCase>> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let delimiter = self
            .delimiter
            .unwrap_or_else(|| Self::detect_delimiter(content));

        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| AppError::ParseError(format!("Failed to read CSV headers: {}", e)))?
            .clone();
        let columns: Vec<Option<Column>> = headers.iter().map(Column::from_header).collect();

        if !columns.contains(&Some(Column::Title)) {
            return Err(AppError::ParseError(
                "CSV is missing a 'Test Case' column.".to_string(),
            ));
        }

        let mut cases = Vec::new();
        for (index, result) in reader.records().enumerate() {
            // Header is line 1
            let line = index + 2;
            let record = result.map_err(|e| {
                AppError::ParseError(format!("Failed to parse CSV row {}: {}", line, e))
            })?;

            match Self::parse_row(&columns, &record, line)? {
                Some(case) => cases.push(case),
                None => debug!(line, "Skipping CSV row without a test case title"),
            }
        }

        Ok(cases)
    }

    fn parse_row(
        columns: &[Option<Column>],
        record: &StringRecord,
        line: usize,
    ) -> Result<Option<NewTestCase>> {
        let mut case = NewTestCase::default();

        for (column, value) in columns.iter().zip(record.iter()) {
            let Some(column) = column else {
                continue;
            };
            match column {
                Column::TestBed => case.test_bed = value.to_string(),
                Column::Title => case.test_case_title = value.to_string(),
                Column::Steps => case.test_steps = value.to_string(),
                Column::Expected => case.expected_result = value.to_string(),
                Column::Notes => {
                    case.notes = (!value.is_empty()).then(|| value.to_string());
                }
                Column::Status => {
                    let status = TestCaseStatus::parse_loose(value).ok_or_else(|| {
                        AppError::ValidationError(format!(
                            "Unknown test case status '{}' on CSV line {}",
                            value, line
                        ))
                    })?;
                    case.status = Some(status);
                }
            }
        }

        if case.test_case_title.is_empty() {
            return Ok(None);
        }
        Ok(Some(case))
    }

    /// Detect delimiter from content (comma, semicolon, tab, pipe)
    pub fn detect_delimiter(content: &str) -> u8 {
        let candidates = [b',', b';', b'\t', b'|'];
        let sample_lines: Vec<&str> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .take(10)
            .collect();

        let mut best_delimiter = b',';
        let mut best_score = 0.0f32;

        if sample_lines.is_empty() {
            return best_delimiter;
        }

        for &delimiter in &candidates {
            let field_counts: Vec<usize> = sample_lines
                .iter()
                .map(|line| line.bytes().filter(|&b| b == delimiter).count())
                .collect();

            // Score by consistency (low standard deviation) and frequency
            let avg = field_counts.iter().sum::<usize>() as f32 / field_counts.len() as f32;
            let variance = field_counts
                .iter()
                .map(|&x| (x as f32 - avg).powi(2))
                .sum::<f32>()
                / field_counts.len() as f32;

            let score = avg / (1.0 + variance.sqrt());
            if score > best_score {
                best_score = score;
                best_delimiter = delimiter;
            }
        }

        best_delimiter
    }
}
