//! Incremental parser for InfluxDB's annotated CSV query results.
//!
//! Results arrive as a sequence of tables. Each table may be preceded by
//! `#datatype`/`#group`/`#default` annotation rows and always starts with a
//! header row; tables are separated by a blank line. Errors raised while
//! the query runs are reported in-band as a table with `error` and
//! `reference` columns.

use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::{FluxRow, StoreError};

#[derive(Debug, Clone)]
struct DataColumns {
    time: usize,
    value: usize,
    field: usize,
    device_id: Option<usize>,
}

#[derive(Debug, Clone)]
enum Header {
    Data(DataColumns),
    Error { error: usize },
}

impl Header {
    fn from_record(record: &csv::StringRecord) -> Result<Self, StoreError> {
        let position = |name: &str| record.iter().position(|c| c == name);

        if let Some(error) = position("error") {
            return Ok(Self::Error { error });
        }

        let required = |name: &str| {
            position(name).ok_or_else(|| StoreError::Decode(format!("result table has no '{name}' column")))
        };

        Ok(Self::Data(DataColumns {
            time: required("_time")?,
            value: required("_value")?,
            field: required("_field")?,
            device_id: position("device_id"),
        }))
    }
}

fn parse_record(line: &str) -> Result<csv::StringRecord, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());

    match reader.records().next() {
        Some(Ok(record)) => Ok(record),
        Some(Err(e)) => Err(StoreError::Decode(format!("invalid CSV row: {e}"))),
        None => Err(StoreError::Decode("empty CSV row".to_string())),
    }
}

impl DataColumns {
    fn row(&self, record: &csv::StringRecord) -> Result<FluxRow, StoreError> {
        let cell = |idx: usize| record.get(idx).unwrap_or("");

        let time_text = cell(self.time);
        let time = OffsetDateTime::parse(time_text, &Rfc3339)
            .map_err(|e| StoreError::Decode(format!("invalid _time '{time_text}': {e}")))?;

        let value_text = cell(self.value);
        let value = if value_text.is_empty() {
            None
        } else {
            Some(
                value_text
                    .parse::<f64>()
                    .map_err(|e| StoreError::Decode(format!("invalid _value '{value_text}': {e}")))?,
            )
        };

        Ok(FluxRow {
            time,
            device_id: self.device_id.map(cell).unwrap_or_default().to_string(),
            field: cell(self.field).to_string(),
            value,
        })
    }
}

#[derive(Debug, Default)]
pub struct AnnotatedCsvParser {
    header: Option<Header>,
}

/// Annotation rows and blank separators end the current table's header.
fn is_table_break(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

impl AnnotatedCsvParser {
    /// Feed one line; returns a row for data lines and `None` for
    /// annotations, headers and table separators.
    pub fn push_line(&mut self, line: &str) -> Result<Option<FluxRow>, StoreError> {
        let line = line.trim_end_matches('\r');

        if is_table_break(line) {
            self.header = None;
            return Ok(None);
        }

        let record = parse_record(line)?;
        if self.header.is_none() {
            self.header = Some(Header::from_record(&record)?);
            return Ok(None);
        }

        match &self.header {
            None => Ok(None),
            Some(Header::Error { error }) => {
                let message = record.get(*error).unwrap_or("unknown error").to_string();
                Err(StoreError::QueryProcessing(message))
            }
            Some(Header::Data(columns)) => columns.row(&record).map(Some),
        }
    }
}

#[derive(Debug, Clone)]
enum ColumnHeader {
    Value(Option<usize>),
    Error { error: usize },
}

/// Collects the non-empty cells of one named column across all tables,
/// e.g. the output of `unique(column: ...)`.
#[derive(Debug)]
pub struct ColumnParser {
    column: String,
    header: Option<ColumnHeader>,
}

impl ColumnParser {
    pub fn new(column: &str) -> Self {
        Self {
            column: column.to_string(),
            header: None,
        }
    }

    pub fn push_line(&mut self, line: &str) -> Result<Option<String>, StoreError> {
        let line = line.trim_end_matches('\r');

        if is_table_break(line) {
            self.header = None;
            return Ok(None);
        }

        let record = parse_record(line)?;
        if self.header.is_none() {
            let position = |name: &str| record.iter().position(|c| c == name);
            let header = match position("error") {
                Some(error) => ColumnHeader::Error { error },
                None => ColumnHeader::Value(position(&self.column)),
            };
            self.header = Some(header);
            return Ok(None);
        }

        match &self.header {
            None => Ok(None),
            Some(ColumnHeader::Error { error }) => {
                let message = record.get(*error).unwrap_or("unknown error").to_string();
                Err(StoreError::QueryProcessing(message))
            }
            Some(ColumnHeader::Value(idx)) => Ok(idx
                .and_then(|i| record.get(i))
                .filter(|v| !v.is_empty())
                .map(str::to_string)),
        }
    }
}
