//! Row canonicalization and the bit-exact CSV cell format.
//!
//! Every cell is quoted, embedded quotes are doubled, rows end in `\n`
//! with no carriage return. The verifier replays the writer's exact cell
//! texts, so both sides go through this module.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use trail_events::{AuditError, Event, TopicSchema, ID_FIELD, TIMESTAMP_FIELD, TRANSACTION_ID_FIELD};

/// Header name of the MAC column, second to last in every secure log.
pub const MAC_COLUMN: &str = "HMAC";
/// Header name of the signature column, last in every secure log.
pub const SIGNATURE_COLUMN: &str = "SIGNATURE";

/// Renders an event into the schema-ordered cell list.
///
/// Absent and null fields become empty cells, strings keep their exact
/// text and anything nested renders as compact JSON.
pub fn canonicalize(event: &Event, schema: &TopicSchema) -> Vec<String> {
    schema
        .fields()
        .iter()
        .map(|field| match event.field(field) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
        })
        .collect()
}

/// Header cells for a secure log: schema fields plus the two fixed
/// trailing columns.
pub fn secure_header(schema: &TopicSchema) -> Vec<String> {
    let mut cells: Vec<String> = schema.fields().to_vec();
    cells.push(MAC_COLUMN.to_owned());
    cells.push(SIGNATURE_COLUMN.to_owned());
    cells
}

/// Cells of a signature row: every schema column and the MAC column
/// empty, the signature in the last column.
pub fn signature_row(schema_width: usize, signature_b64: &str) -> Vec<String> {
    let mut cells = vec![String::new(); schema_width + 1];
    cells.push(signature_b64.to_owned());
    cells
}

/// Formats one row as bytes in the canonical quoting discipline.
pub fn format_row(cells: &[String]) -> Result<Vec<u8>, AuditError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer
        .write_record(cells)
        .and_then(|()| writer.flush().map_err(csv::Error::from))
        .map_err(|err| AuditError::Internal(format!("formatting row: {err}")))?;
    writer
        .into_inner()
        .map_err(|err| AuditError::Internal(format!("formatting row: {err}")))
}

/// Rebuilds an event from the schema cells of one data row.
///
/// Empty cells stay absent. The three core fields are always plain text;
/// other cells that parse as JSON containers, numbers, booleans or null
/// recover that value, anything else stays a string.
pub fn event_from_cells(schema: &TopicSchema, cells: &[String]) -> Event {
    let mut fields = Map::new();
    for (name, cell) in schema.fields().iter().zip(cells) {
        if cell.is_empty() {
            continue;
        }
        let value = if is_core_field(name) {
            Value::String(cell.clone())
        } else {
            recover_cell(cell)
        };
        fields.insert(name.clone(), value);
    }
    Event::from_fields(fields)
}

fn is_core_field(name: &str) -> bool {
    matches!(name, ID_FIELD | TIMESTAMP_FIELD | TRANSACTION_ID_FIELD)
}

fn recover_cell(cell: &str) -> Value {
    match serde_json::from_str::<Value>(cell) {
        Ok(value) if !matches!(value, Value::String(_)) => value,
        _ => Value::String(cell.to_owned()),
    }
}

/// Sequential reader over the rows of one log file.
pub struct RowReader {
    path: PathBuf,
    records: csv::StringRecordsIntoIter<File>,
}

impl RowReader {
    pub fn open(path: &Path) -> Result<Self, AuditError> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|err| csv_io_error(path, err))?;
        Ok(Self {
            path: path.to_path_buf(),
            records: reader.into_records(),
        })
    }

    /// The next row's cells, or `None` at end of file.
    pub fn next_row(&mut self) -> Result<Option<Vec<String>>, AuditError> {
        match self.records.next() {
            Some(Ok(record)) => Ok(Some(record.iter().map(str::to_owned).collect())),
            Some(Err(err)) => Err(csv_io_error(&self.path, err)),
            None => Ok(None),
        }
    }
}

fn csv_io_error(path: &Path, err: csv::Error) -> AuditError {
    match err.into_kind() {
        csv::ErrorKind::Io(io_err) => AuditError::io(path, io_err),
        other => AuditError::io(
            path,
            io::Error::new(io::ErrorKind::InvalidData, format!("{other:?}")),
        ),
    }
}
