// Tabular parsing and file loading.
//
// Parsing never fails: blank lines are skipped, short rows are padded,
// malformed quoting degrades to a plain comma split. Column checks are a
// separate, advisory step so callers decide whether to block an upload.
use crate::error::{KpiError, Result};
use crate::types::{Column, Row};
use crate::util::{normalize_header, parse_date_safe};
use csv::ReaderBuilder;
use std::path::Path;
use tracing::{debug, warn};

/// Header plus data rows of one CSV text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTable {
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

impl ParsedTable {
    pub fn missing_columns<S: AsRef<str>>(&self, required: &[S]) -> Vec<String> {
        missing_columns(&self.header, required)
    }
}

/// Parse raw CSV text into a header and one [`Row`] per data line.
pub fn parse_table(text: &str) -> ParsedTable {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let Some(first) = lines.next() else {
        return ParsedTable::default();
    };
    let header = split_line(first);

    let rows = lines
        .map(|line| {
            let cells = split_line(line);
            header
                .iter()
                .enumerate()
                .map(|(idx, h)| (h.clone(), cells.get(idx).cloned().unwrap_or_default()))
                .collect::<Row>()
        })
        .collect();

    ParsedTable { header, rows }
}

/// Split one line on commas outside double quotes.
///
/// `""` inside a quoted field is a literal quote. Every cell is trimmed and
/// stray leading/trailing quotes left over from sloppy quoting are removed.
fn split_line(line: &str) -> Vec<String> {
    let tight = tighten_delimiters(line);
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(tight.as_bytes());

    // A single flexible record never errors; unbalanced quotes run to the end
    // of the line.
    rdr.records()
        .next()
        .and_then(|r| r.ok())
        .map(|record| record.iter().map(clean_cell).collect())
        .unwrap_or_default()
}

/// Drop whitespace around delimiters outside quotes so a quote after
/// `, ` still opens a quoted field.
fn tighten_delimiters(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_quotes = false;
    let mut field_start = true;
    for ch in line.chars() {
        if field_start && !in_quotes && ch.is_whitespace() {
            continue;
        }
        field_start = false;
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                out.push(ch);
            }
            ',' if !in_quotes => {
                out.truncate(out.trim_end().len());
                out.push(ch);
                field_start = true;
            }
            _ => out.push(ch),
        }
    }
    if !in_quotes {
        out.truncate(out.trim_end().len());
    }
    out
}

fn clean_cell(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed.strip_prefix('"').unwrap_or(trimmed);
    let unquoted = unquoted.strip_suffix('"').unwrap_or(unquoted);
    unquoted.trim().to_string()
}

/// Required columns absent from `header`, compared ignoring case and
/// whitespace. Reported with the caller's spelling, in the caller's order.
pub fn missing_columns<H: AsRef<str>, S: AsRef<str>>(header: &[H], required: &[S]) -> Vec<String> {
    let present: Vec<String> = header.iter().map(|h| normalize_header(h.as_ref())).collect();
    required
        .iter()
        .map(AsRef::as_ref)
        .filter(|r| !present.contains(&normalize_header(r)))
        .map(str::to_string)
        .collect()
}

pub fn column_names(columns: &[Column]) -> Vec<&'static str> {
    columns.iter().map(|c| c.name()).collect()
}

/// Upload gate: a file must have at least one data row and every required
/// column.
pub fn validate_upload<S: AsRef<str>>(name: &str, text: &str, required: &[S]) -> Result<ParsedTable> {
    let table = parse_table(text);
    let missing = table.missing_columns(required);
    if !missing.is_empty() {
        warn!(file = name, ?missing, "upload is missing required columns");
        return Err(KpiError::MissingColumns {
            file: name.to_string(),
            missing,
        });
    }
    if table.rows.is_empty() {
        warn!(file = name, "upload has no data rows");
        return Err(KpiError::NoDataRows {
            file: name.to_string(),
        });
    }
    Ok(table)
}

/// Read and parse a CSV file. Only I/O problems are errors.
pub fn load_table(path: &Path) -> Result<ParsedTable> {
    let text = std::fs::read_to_string(path)?;
    let table = parse_table(&text);
    debug!(
        path = %path.display(),
        columns = table.header.len(),
        rows = table.rows.len(),
        "parsed table"
    );
    Ok(table)
}

/// `YYYY-MM` of the latest parseable `Date` in `rows`, used to label a
/// period when the caller has no better name for it.
pub fn period_label(rows: &[Row]) -> Option<String> {
    rows.iter()
        .filter_map(|r| parse_date_safe(r.field(Column::Date)))
        .max()
        .map(|d| d.format("%Y-%m").to_string())
}
