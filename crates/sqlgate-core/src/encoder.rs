//! Streaming result-set encoder.
//!
//! Implements [`RowSink`] over any `Write`, emitting the success envelope
//! incrementally: header, then one JSON object per row, then the trailer
//! with the row count. Nothing buffers the full result set, so the driver's
//! row loop and the HTTP response body advance in lockstep.
//!
//! Large-object cells are never inlined. Each one is spooled to the user's
//! blob directory under a generated file id, and the cell carries the id. A
//! SQL NULL in a large-object column spools the null marker file, so a later
//! download can tell NULL from empty.

use serde_json::{json, Value};
use sqlgate_driver::{DriverError, DriverResult, RowSink};
use sqlgate_filestore::BlobDir;
use sqlgate_wire::{codec, ResultColumn, SqlValue};
use std::collections::HashMap;
use std::io::Write;

/// Per-request encoding knobs, both client- or server-elected.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeSettings {
    /// Emit the `column_types` array before the rows (`column_types=true`).
    pub include_column_types: bool,
    /// Reverse the HTML-safe encoding on CLOB text before spooling it.
    pub html_unescape_clobs: bool,
}

pub struct QueryEncoder<W: Write> {
    out: W,
    blob_dir: BlobDir,
    settings: EncodeSettings,
    columns: Vec<ResultColumn>,
    row_count: u64,
    header_written: bool,
    rowids: HashMap<String, i64>,
}

impl<W: Write> QueryEncoder<W> {
    pub fn new(out: W, blob_dir: BlobDir, settings: EncodeSettings) -> Self {
        Self {
            out,
            blob_dir,
            settings,
            columns: Vec::new(),
            row_count: 0,
            header_written: false,
            rowids: HashMap::new(),
        }
    }

    /// Close the envelope. Returns the writer, the row count, and the row
    /// identifiers encountered, for registration on the connection.
    pub fn finish(mut self) -> DriverResult<(W, u64, HashMap<String, i64>)> {
        if !self.header_written {
            self.write_header()?;
        }
        let trailer = format!("],\"row_count\":{}}}\n", self.row_count);
        self.write_out(trailer.as_bytes())?;
        self.flush()?;
        Ok((self.out, self.row_count, self.rowids))
    }

    fn write_header(&mut self) -> DriverResult<()> {
        let mut header = String::from("{\"status\":\"OK\",");
        if self.settings.include_column_types {
            let types: Vec<&str> = self.columns.iter().map(|c| c.type_name.as_str()).collect();
            header.push_str("\"column_types\":");
            header.push_str(&json!(types).to_string());
            header.push(',');
        }
        header.push_str("\"query_rows\":[");
        self.write_out(header.as_bytes())?;
        self.header_written = true;
        Ok(())
    }

    fn write_out(&mut self, bytes: &[u8]) -> DriverResult<()> {
        self.out.write_all(bytes).map_err(stream_closed)
    }

    fn flush(&mut self) -> DriverResult<()> {
        self.out.flush().map_err(stream_closed)
    }

    fn encode_cell(&mut self, column: &ResultColumn, cell: &Option<SqlValue>) -> DriverResult<Value> {
        let Some(value) = cell else {
            // Absent value, distinct from a typed SQL NULL.
            return Ok(Value::Null);
        };
        if column.is_large_object {
            return self.spool_cell(value);
        }
        let encoded = match value {
            SqlValue::Null(_) => Value::String("NULL".to_string()),
            SqlValue::Bool(b) => json!(b),
            SqlValue::I16(n) => json!(n),
            SqlValue::I32(n) => json!(n),
            SqlValue::I64(n) => json!(n),
            SqlValue::F32(n) => json!(n),
            SqlValue::F64(n) => json!(n),
            SqlValue::Decimal(s) => Value::String(s.clone()),
            SqlValue::Text(s) => Value::String(s.clone()),
            SqlValue::Url(s) => Value::String(s.clone()),
            SqlValue::Date(ms) | SqlValue::Time(ms) | SqlValue::Timestamp(ms) => {
                Value::String(ms.to_string())
            }
            SqlValue::Bytes(_) => return self.spool_cell(value),
            SqlValue::Array(items) => {
                let mut rendered = Vec::with_capacity(items.len());
                for item in items {
                    rendered.push(self.encode_cell(
                        &ResultColumn::new(column.type_code, &column.type_name, &column.name, None),
                        &Some(item.clone()),
                    )?);
                }
                Value::Array(rendered)
            }
            SqlValue::RowId(id) => {
                let serialized = id.to_string();
                self.rowids.insert(serialized.clone(), *id);
                Value::String(serialized)
            }
        };
        Ok(encoded)
    }

    /// Spool a large-object cell and return its generated file id.
    fn spool_cell(&mut self, value: &SqlValue) -> DriverResult<Value> {
        let id = match value {
            SqlValue::Null(_) => {
                let id = BlobDir::new_blob_id();
                self.blob_dir.spool_null(&id).map_err(spool_failed)?;
                id
            }
            SqlValue::Text(text) => {
                let id = BlobDir::new_clob_id();
                let spooled;
                let text: &str = if self.settings.html_unescape_clobs {
                    spooled = codec::html_unescape(text);
                    &spooled
                } else {
                    text
                };
                self.blob_dir.spool_text(&id, text).map_err(spool_failed)?;
                id
            }
            SqlValue::Bytes(bytes) => {
                let id = BlobDir::new_blob_id();
                self.blob_dir
                    .spool(&id, &mut &bytes[..])
                    .map_err(spool_failed)?;
                id
            }
            other => {
                // Vendor quirk: numeric object identifiers classified as
                // large objects still come through as plain scalars.
                match codec::decode_scalar(other) {
                    Some(text) => return Ok(Value::String(text)),
                    None => {
                        return Err(DriverError::Sql {
                            message: "unspoolable large-object cell".to_string(),
                            detail: None,
                        })
                    }
                }
            }
        };
        Ok(Value::String(id))
    }
}

impl<W: Write> RowSink for QueryEncoder<W> {
    fn columns(&mut self, columns: &[ResultColumn]) -> DriverResult<()> {
        self.columns = columns.to_vec();
        self.write_header()
    }

    fn row(&mut self, cells: &[Option<SqlValue>]) -> DriverResult<()> {
        let mut object = serde_json::Map::with_capacity(cells.len());
        for (i, cell) in cells.iter().enumerate() {
            let column = self.columns.get(i).cloned().unwrap_or_else(|| {
                ResultColumn::new(0, "UNKNOWN", format!("c{}", i + 1), None)
            });
            object.insert(column.name.clone(), self.encode_cell(&column, cell)?);
        }
        let mut line = String::new();
        if self.row_count > 0 {
            line.push(',');
        }
        line.push_str(&Value::Object(object).to_string());
        self.write_out(line.as_bytes())?;
        self.row_count += 1;
        Ok(())
    }
}

fn stream_closed(e: std::io::Error) -> DriverError {
    DriverError::Sql {
        message: format!("result stream closed: {e}"),
        detail: None,
    }
}

fn spool_failed(e: sqlgate_filestore::FilestoreError) -> DriverError {
    DriverError::Sql {
        message: format!("large-object spooling failed: {e}"),
        detail: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(
        columns: &[ResultColumn],
        rows: &[Vec<Option<SqlValue>>],
        settings: EncodeSettings,
    ) -> (Value, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut enc = QueryEncoder::new(
            Vec::new(),
            BlobDir::new(dir.path()),
            settings,
        );
        enc.columns(columns).unwrap();
        for row in rows {
            enc.row(row).unwrap();
        }
        let (bytes, _, _) = enc.finish().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.ends_with('\n'));
        (serde_json::from_str(text.trim_end()).unwrap(), dir)
    }

    fn col(type_code: i32, type_name: &str, name: &str) -> ResultColumn {
        ResultColumn::new(type_code, type_name, name, None)
    }

    #[test]
    fn test_scalar_rows() {
        let (v, _dir) = encode(
            &[col(4, "INTEGER", "id"), col(12, "VARCHAR", "name")],
            &[
                vec![Some(SqlValue::I32(1)), Some(SqlValue::Text("ada".into()))],
                vec![Some(SqlValue::I32(2)), Some(SqlValue::Null(12))],
            ],
            EncodeSettings::default(),
        );
        assert_eq!(v["status"], "OK");
        assert_eq!(v["row_count"], 2);
        assert_eq!(v["query_rows"][0]["id"], 1);
        assert_eq!(v["query_rows"][0]["name"], "ada");
        // Typed SQL NULL renders as the literal string.
        assert_eq!(v["query_rows"][1]["name"], "NULL");
        assert!(v.get("column_types").is_none());
    }

    #[test]
    fn test_column_types_on_opt_in() {
        let (v, _dir) = encode(
            &[col(4, "INTEGER", "id")],
            &[],
            EncodeSettings {
                include_column_types: true,
                ..Default::default()
            },
        );
        assert_eq!(v["column_types"], json!(["INTEGER"]));
        assert_eq!(v["row_count"], 0);
    }

    #[test]
    fn test_absent_cell_stays_json_null() {
        let (v, _dir) = encode(
            &[col(4, "INTEGER", "id")],
            &[vec![None]],
            EncodeSettings::default(),
        );
        assert!(v["query_rows"][0]["id"].is_null());
    }

    #[test]
    fn test_temporal_cells_become_millis_strings() {
        let (v, _dir) = encode(
            &[col(91, "DATE", "d"), col(93, "TIMESTAMP", "ts")],
            &[vec![
                Some(SqlValue::Date(86_400_000)),
                Some(SqlValue::Timestamp(1_700_000_000_000)),
            ]],
            EncodeSettings::default(),
        );
        assert_eq!(v["query_rows"][0]["d"], "86400000");
        assert_eq!(v["query_rows"][0]["ts"], "1700000000000");
    }

    #[test]
    fn test_blob_cell_is_spooled_not_inlined() {
        let (v, dir) = encode(
            &[col(2004, "BLOB", "payload")],
            &[vec![Some(SqlValue::Bytes(vec![1, 2, 3]))]],
            EncodeSettings::default(),
        );
        let id = v["query_rows"][0]["payload"].as_str().unwrap().to_string();
        assert!(id.ends_with(".blob"));
        let blobs = BlobDir::new(dir.path());
        assert_eq!(blobs.read_bytes(&id).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_null_lob_spools_marker_file() {
        let (v, dir) = encode(
            &[col(2004, "BLOB", "payload")],
            &[vec![Some(SqlValue::Null(2004))]],
            EncodeSettings::default(),
        );
        let id = v["query_rows"][0]["payload"].as_str().unwrap().to_string();
        let blobs = BlobDir::new(dir.path());
        assert!(blobs.is_null(&id).unwrap());
        assert_eq!(blobs.length(&id).unwrap(), 0);
    }

    #[test]
    fn test_clob_cell_spooled_with_unescape() {
        let (v, dir) = encode(
            &[col(2005, "CLOB", "body")],
            &[vec![Some(SqlValue::Text("a &lt;b&gt; c".into()))]],
            EncodeSettings {
                html_unescape_clobs: true,
                ..Default::default()
            },
        );
        let id = v["query_rows"][0]["body"].as_str().unwrap().to_string();
        assert!(id.ends_with(".clob.txt"));
        let blobs = BlobDir::new(dir.path());
        assert_eq!(blobs.read_text(&id).unwrap(), "a <b> c");
    }

    #[test]
    fn test_rowids_serialized_and_collected() {
        let dir = tempfile::tempdir().unwrap();
        let mut enc = QueryEncoder::new(
            Vec::new(),
            BlobDir::new(dir.path()),
            EncodeSettings::default(),
        );
        enc.columns(&[col(-8, "ROWID", "rid")]).unwrap();
        enc.row(&[Some(SqlValue::RowId(77))]).unwrap();
        let (bytes, count, rowids) = enc.finish().unwrap();
        assert_eq!(count, 1);
        assert_eq!(rowids.get("77"), Some(&77));
        let v: Value = serde_json::from_str(
            String::from_utf8(bytes).unwrap().trim_end(),
        )
        .unwrap();
        assert_eq!(v["query_rows"][0]["rid"], "77");
    }

    #[test]
    fn test_array_cell_renders_nested() {
        let (v, _dir) = encode(
            &[col(2003, "ARRAY", "tags")],
            &[vec![Some(SqlValue::Array(vec![
                SqlValue::Text("x".into()),
                SqlValue::Text("y".into()),
            ]))]],
            EncodeSettings::default(),
        );
        assert_eq!(v["query_rows"][0]["tags"], json!(["x", "y"]));
    }
}
