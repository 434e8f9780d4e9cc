use crate::error::{PipelineError, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// A delimited text file held in memory as raw string cells.
///
/// Cells are kept as text. Each preprocessor decides how to parse the
/// columns it selects.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    headers: Vec<String>,
    col_indices: HashMap<String, usize>,
    rows: Vec<StringRecord>,
}

impl Table {
    pub fn from_path(name: &str, path: &Path, delimiter: char) -> Result<Self> {
        info!("Loading {} table from {:?}", name, path);
        let file = File::open(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::from_reader(name, file, delimiter)?;
        info!("Loaded {} rows into {} table", table.len(), name);
        Ok(table)
    }

    pub fn from_reader<R: Read>(name: &str, reader: R, delimiter: char) -> Result<Self> {
        if !delimiter.is_ascii() {
            return Err(PipelineError::InvalidDelimiter {
                table: name.to_string(),
                delimiter,
            });
        }
        let mut rdr = ReaderBuilder::new()
            .delimiter(delimiter as u8)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        // First occurrence wins for duplicated header names
        let mut col_indices = HashMap::new();
        for (i, h) in headers.iter().enumerate() {
            col_indices.entry(h.clone()).or_insert(i);
        }

        let rows = rdr.records().collect::<std::result::Result<Vec<_>, _>>()?;
        debug!(table = name, columns = headers.len(), rows = rows.len(), "Parsed table");

        Ok(Self {
            name: name.to_string(),
            headers,
            col_indices,
            rows,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.col_indices.get(column).copied()
    }

    /// Index of a column that must exist.
    pub fn require_column(&self, column: &str) -> Result<usize> {
        self.column_index(column)
            .ok_or_else(|| PipelineError::MissingColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }

    /// Index of the join-key column.
    pub fn require_key(&self, column: &str) -> Result<usize> {
        self.column_index(column)
            .ok_or_else(|| PipelineError::JoinKeyMismatch {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }

    pub fn rows(&self) -> impl Iterator<Item = &StringRecord> {
        self.rows.iter()
    }
}

/// Replaces decimal commas with decimal points. Applying it twice is a no-op.
pub fn normalize_decimal(text: &str) -> String {
    text.trim().replace(',', ".")
}

pub fn parse_decimal(text: &str) -> Option<f64> {
    let normalized = normalize_decimal(text);
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a postal code as an integer. Values like "10117.0", which spreadsheet
/// exports produce, are accepted when the fractional part is zero.
pub fn parse_postal_code(text: &str) -> Option<u32> {
    let text = text.trim();
    if let Ok(code) = text.parse::<u32>() {
        return Some(code);
    }
    let value = parse_decimal(text)?;
    if value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_semicolon_table_with_headers() {
        let csv = "PLZ;geometry\n10117;POLYGON((0 0,1 0,1 1,0 0))\n10119;\n";
        let table = Table::from_reader("geometry", csv.as_bytes(), ';').unwrap();

        assert_eq!(table.headers(), &["PLZ".to_string(), "geometry".to_string()]);
        assert_eq!(table.len(), 2);
        let idx = table.require_column("geometry").unwrap();
        let cells: Vec<&str> = table.rows().map(|r| r.get(idx).unwrap_or("")).collect();
        assert_eq!(cells, vec!["POLYGON((0 0,1 0,1 1,0 0))", ""]);
    }

    #[test]
    fn strips_byte_order_mark_from_first_header() {
        let csv = "\u{feff}plz,einwohner\n10115,28000\n";
        let table = Table::from_reader("residents", csv.as_bytes(), ',').unwrap();
        assert_eq!(table.column_index("plz"), Some(0));
    }

    #[test]
    fn missing_columns_are_classified() {
        let table = Table::from_reader("stations", "a;b\n1;2\n".as_bytes(), ';').unwrap();

        assert!(matches!(
            table.require_column("Bundesland"),
            Err(PipelineError::MissingColumn { column, .. }) if column == "Bundesland"
        ));
        assert!(matches!(
            table.require_key("PLZ"),
            Err(PipelineError::JoinKeyMismatch { table, .. }) if table == "stations"
        ));
    }

    #[test]
    fn non_ascii_delimiter_is_rejected() {
        let csv = "a\u{e4}b\n1\u{e4}2\n";
        let err = Table::from_reader("stations", csv.as_bytes(), '\u{e4}').unwrap_err();

        assert!(matches!(
            err,
            PipelineError::InvalidDelimiter { delimiter: '\u{e4}', .. }
        ));
    }

    #[test]
    fn decimal_normalization_is_idempotent() {
        let once = normalize_decimal("52,520008");
        assert_eq!(once, "52.520008");
        assert_eq!(normalize_decimal(&once), once);
    }

    #[test]
    fn parses_decimal_comma_numbers() {
        assert_eq!(parse_decimal("22,5"), Some(22.5));
        assert_eq!(parse_decimal(" 11 "), Some(11.0));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("n/a"), None);
    }

    #[test]
    fn postal_codes_are_numeric() {
        assert_eq!(parse_postal_code("10117"), Some(10117));
        assert_eq!(parse_postal_code("10117.0"), Some(10117));
        assert_eq!(parse_postal_code("09999"), Some(9999));
        assert_eq!(parse_postal_code("10117.5"), None);
        assert_eq!(parse_postal_code("D-10117"), None);
    }
}
