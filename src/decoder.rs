use calamine::{Data, DataType, Reader, open_workbook_auto_from_rs};
use csv::ReaderBuilder;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::Path;

use crate::error::DecodeError;
use crate::value::{FieldValue, Row};

/// Key under which delimited-text cells beyond the header width are collected.
pub const EXTRA_FIELDS_KEY: &str = "__parsed_extra";

/// Key prefix given to spreadsheet columns whose header cell is blank.
pub const EMPTY_HEADER_KEY: &str = "__EMPTY";

/// How an uploaded file is parsed, decided by its extension alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// `.xlsx` / `.xls` workbook, first sheet only.
    Spreadsheet,
    /// Tab-delimited text with a header line.
    Tsv,
    /// Comma-delimited text with a header line. Fallback for every other extension.
    Csv,
}

impl FileKind {
    /// Detect the file kind from the text after the last `.` (case-insensitive).
    ///
    /// # Examples
    /// ```
    /// use tabdeck::decoder::FileKind;
    ///
    /// assert_eq!(FileKind::from_file_name("Report.XLSX"), FileKind::Spreadsheet);
    /// assert_eq!(FileKind::from_file_name("data.tsv"), FileKind::Tsv);
    /// assert_eq!(FileKind::from_file_name("notes.txt"), FileKind::Csv);
    /// ```
    pub fn from_file_name(file_name: &str) -> Self {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase());

        match extension.as_deref() {
            Some("xlsx") | Some("xls") => FileKind::Spreadsheet,
            Some("tsv") => FileKind::Tsv,
            _ => FileKind::Csv,
        }
    }
}

/// Decode an uploaded file into rows
///
/// Spreadsheets use the header row of their first sheet as keys; delimited text
/// uses its first line. One row is produced per data line/row, in file order.
///
/// # Arguments
/// * `file_name` - Name of the uploaded file, used for format detection and errors
/// * `bytes` - Raw file content
///
/// # Returns
/// * `Result<Vec<Row>, DecodeError>` - Decoded rows, or an error if the content cannot be parsed
///
/// # Examples
/// ```
/// use tabdeck::decoder::decode;
/// use tabdeck::value::FieldValue;
///
/// let rows = decode("data.csv", b"a,b\n1,2").unwrap();
/// assert_eq!(rows.len(), 1);
/// assert_eq!(rows[0].get("b"), Some(&FieldValue::from("2")));
/// ```
pub fn decode(file_name: &str, bytes: &[u8]) -> Result<Vec<Row>, DecodeError> {
    let kind = FileKind::from_file_name(file_name);
    let rows = match kind {
        FileKind::Spreadsheet => decode_spreadsheet(file_name, bytes)?,
        FileKind::Tsv => decode_delimited(file_name, bytes, b'\t')?,
        FileKind::Csv => decode_delimited(file_name, bytes, b',')?,
    };
    debug!("Decoded {} rows from '{}' as {:?}", rows.len(), file_name, kind);
    Ok(rows)
}

/// Read a file from disk and decode it
///
/// # Arguments
/// * `path` - Path to a local CSV, TSV or spreadsheet file
///
/// # Returns
/// * `Result<Vec<Row>, DecodeError>` - Decoded rows or an error
///
/// # Examples
/// ```no_run
/// use tabdeck::decoder::decode_path;
///
/// match decode_path("data.csv") {
///     Ok(rows) => println!("Decoded {} rows", rows.len()),
///     Err(e) => eprintln!("Error decoding file: {}", e),
/// }
/// ```
pub fn decode_path(path: impl AsRef<Path>) -> Result<Vec<Row>, DecodeError> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();
    let bytes = std::fs::read(path).map_err(|e| DecodeError::new(&file_name, e))?;
    decode(&file_name, &bytes)
}

fn decode_delimited(file_name: &str, bytes: &[u8], delimiter: u8) -> Result<Vec<Row>, DecodeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| DecodeError::new(file_name, format!("content is not valid UTF-8: {}", e)))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .quoting(true)
        .double_quote(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = unique_headers(
        reader
            .headers()
            .map_err(|e| DecodeError::new(file_name, e))?
            .iter()
            .map(String::from),
    );

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DecodeError::new(file_name, e))?;
        let mut row = Row::with_capacity(headers.len());
        let mut extra = Vec::new();

        for (idx, value) in record.iter().enumerate() {
            match headers.get(idx) {
                Some(header) => {
                    row.insert(header.as_str(), value);
                }
                None => extra.push(FieldValue::from(value)),
            }
        }
        if !extra.is_empty() {
            row.insert(EXTRA_FIELDS_KEY, FieldValue::List(extra));
        }
        rows.push(row);
    }

    Ok(rows)
}

fn decode_spreadsheet(file_name: &str, bytes: &[u8]) -> Result<Vec<Row>, DecodeError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| DecodeError::new(file_name, e))?;

    // The first worksheet in declaration order
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DecodeError::new(file_name, "workbook contains no sheets"))?
        .map_err(|e| DecodeError::new(file_name, e))?;

    let mut sheet_rows = range.rows();
    let headers = match sheet_rows.next() {
        Some(header_row) => spreadsheet_headers(header_row),
        None => return Ok(Vec::new()),
    };

    let mut rows = Vec::new();
    for sheet_row in sheet_rows {
        let mut row = Row::with_capacity(headers.len());
        for (idx, cell) in sheet_row.iter().enumerate() {
            let Some(header) = headers.get(idx) else {
                continue;
            };
            if let Some(value) = cell_value(cell) {
                row.insert(header.as_str(), value);
            }
        }
        // Fully blank rows are skipped
        if !row.is_empty() {
            rows.push(row);
        }
    }

    Ok(rows)
}

// Header names for a sheet; blank header cells become __EMPTY, __EMPTY_1, ...
fn spreadsheet_headers(header_row: &[Data]) -> Vec<String> {
    unique_headers(header_row.iter().map(|cell| match cell_value(cell) {
        Some(value) => value.to_string(),
        None => EMPTY_HEADER_KEY.to_string(),
    }))
}

// Repeated header names get a numeric suffix (a, a_1, a_2) so no column is lost
fn unique_headers(headers: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut used = HashSet::new();
    let mut suffixes: HashMap<String, usize> = HashMap::new();
    headers
        .into_iter()
        .map(|header| {
            let mut name = header.clone();
            while used.contains(&name) {
                let suffix = suffixes.entry(header.clone()).or_insert(0);
                *suffix += 1;
                name = format!("{}_{}", header, suffix);
            }
            used.insert(name.clone());
            name
        })
        .collect()
}

// Convert one spreadsheet cell; blank cells produce no field
fn cell_value(cell: &Data) -> Option<FieldValue> {
    match cell {
        Data::Empty => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(FieldValue::Text(s.clone())),
        Data::Int(i) => Some(FieldValue::Int(*i)),
        Data::Float(f) => {
            if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                Some(FieldValue::Int(*f as i64))
            } else {
                Some(FieldValue::Float(*f))
            }
        }
        Data::Bool(b) => Some(FieldValue::Bool(*b)),
        Data::DateTime(_) => match cell.as_datetime() {
            Some(dt) => Some(FieldValue::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string())),
            None => Some(FieldValue::Text(cell.to_string())),
        },
        other => Some(FieldValue::Text(other.to_string())),
    }
}
