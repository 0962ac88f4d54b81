use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    StringArray,
};
use arrow::datatypes::{
    DataType, Float16Type, Int16Type, Int8Type, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use log::debug;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::load::FormulaSource;
use super::model::{CellValue, FormulaLookup, RawRow, RawTable};
use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a compound table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – one row per compound, flat scalar columns
/// * `.json`    – `[{ "name": "...", "group": "...", "s1": 1.0, ... }, ...]`
/// * `.csv`     – header row; cells typed by guessing
pub fn load_table(path: &Path) -> Result<RawTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported file extension: .{other}"),
    }?;
    debug!(
        "{}: {} rows, {} columns",
        path.display(),
        table.len(),
        table.columns.len()
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "name": "C6H12O6_1", "group": "control", "s1": 1200.5, "blank1": 3.0 },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<RawTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;

    let mut rows = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;
        let row: RawRow = obj
            .iter()
            .map(|(key, val)| (key.clone(), json_to_cell(val)))
            .collect();
        rows.push(row);
    }

    Ok(RawTable::from_rows(rows))
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => CellValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one compound per row.
fn load_csv(path: &Path) -> Result<RawTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .map(|(col, value)| (col.clone(), guess_cell_type(value.trim())))
            .collect();
        rows.push(row);
    }

    Ok(RawTable::new(headers, rows))
}

fn guess_cell_type(s: &str) -> CellValue {
    if s.is_empty() {
        return CellValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return CellValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return CellValue::Float(f);
    }
    if s == "true" || s == "false" {
        return CellValue::Bool(s == "true");
    }
    CellValue::String(s.to_string())
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one compound per row.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`). Unsupported column types are read as
/// their type name.
fn load_parquet(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let columns: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build().context("building parquet reader")?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();
        for row in 0..batch.num_rows() {
            let values: RawRow = schema
                .fields()
                .iter()
                .enumerate()
                .map(|(i, f)| (f.name().clone(), extract_cell(batch.column(i), row)))
                .collect();
            rows.push(values);
        }
    }

    Ok(RawTable::new(columns, rows))
}

// -- Parquet / Arrow helpers --

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell(col: &Arc<dyn Array>, row: usize) -> CellValue {
    if col.is_null(row) {
        return CellValue::Null;
    }
    let any = col.as_any();
    match col.data_type() {
        DataType::Utf8 => match any.downcast_ref::<StringArray>() {
            Some(s) => CellValue::String(s.value(row).to_string()),
            None => CellValue::Null,
        },
        DataType::LargeUtf8 => CellValue::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Int32 => any
            .downcast_ref::<Int32Array>()
            .map_or(CellValue::Null, |a| CellValue::Integer(a.value(row) as i64)),
        DataType::Int64 => any
            .downcast_ref::<Int64Array>()
            .map_or(CellValue::Null, |a| CellValue::Integer(a.value(row))),
        DataType::Float32 => any
            .downcast_ref::<Float32Array>()
            .map_or(CellValue::Null, |a| CellValue::Float(a.value(row) as f64)),
        DataType::Float64 => any
            .downcast_ref::<Float64Array>()
            .map_or(CellValue::Null, |a| CellValue::Float(a.value(row))),
        DataType::Int8 => col
            .as_primitive_opt::<Int8Type>()
            .map_or(CellValue::Null, |a| CellValue::Integer(a.value(row).into())),
        DataType::Int16 => col
            .as_primitive_opt::<Int16Type>()
            .map_or(CellValue::Null, |a| CellValue::Integer(a.value(row).into())),
        DataType::UInt8 => col
            .as_primitive_opt::<UInt8Type>()
            .map_or(CellValue::Null, |a| CellValue::Integer(a.value(row).into())),
        DataType::UInt16 => col
            .as_primitive_opt::<UInt16Type>()
            .map_or(CellValue::Null, |a| CellValue::Integer(a.value(row).into())),
        DataType::UInt32 => col
            .as_primitive_opt::<UInt32Type>()
            .map_or(CellValue::Null, |a| CellValue::Integer(a.value(row).into())),
        // Beyond i64::MAX only the float is representable.
        DataType::UInt64 => col.as_primitive_opt::<UInt64Type>().map_or(CellValue::Null, |a| {
            let v = a.value(row);
            i64::try_from(v).map_or(CellValue::Float(v as f64), CellValue::Integer)
        }),
        DataType::Float16 => col
            .as_primitive_opt::<Float16Type>()
            .map_or(CellValue::Null, |a| CellValue::Float(a.value(row).to_f64())),
        DataType::Boolean => any
            .downcast_ref::<BooleanArray>()
            .map_or(CellValue::Null, |a| CellValue::Bool(a.value(row))),
        other => CellValue::String(format!("{other:?}")),
    }
}

// ---------------------------------------------------------------------------
// Formula files
// ---------------------------------------------------------------------------

/// Read a two-column CSV (`name,formula` with a header row). Rows with an
/// empty name or formula are skipped.
pub fn load_formula_csv(path: &Path) -> Result<FormulaLookup> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening formula file {}", path.display()))?;
    let mut lookup = FormulaLookup::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("formula file row {row_no}"))?;
        match (record.get(0).map(str::trim), record.get(1).map(str::trim)) {
            (Some(name), Some(formula)) if !name.is_empty() && !formula.is_empty() => {
                lookup.insert(name, formula);
            }
            _ => debug!("formula file row {row_no} skipped"),
        }
    }
    Ok(lookup)
}

/// Formula source backed by a CSV file that may not exist.
#[derive(Debug, Clone)]
pub struct FileFormulaSource {
    pub path: PathBuf,
}

impl FileFormulaSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FormulaSource for FileFormulaSource {
    fn load_formulas(&self) -> Result<FormulaLookup, PipelineError> {
        load_formula_csv(&self.path).map_err(|err| PipelineError::FormulaLookupUnavailable {
            reason: format!("{err:#}"),
        })
    }
}
