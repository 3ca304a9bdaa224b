//! On-disk encodings of the results table.

use arrow_array::{Array, ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::{BenchError, Result};
use crate::fsutil::{ensure_parent_dir, sibling_tmp_path};

pub const COLUMNS: [&str; 9] = [
    "problem",
    "solver",
    "settings",
    "cost",
    "iterations",
    "runtime_external",
    "runtime_internal",
    "runtime_fair",
    "status",
];

/// One row of the results table. `(problem, solver, settings)` is the
/// identity of a row. Empty float cells, as pandas writes NaN, read as NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub problem: String,
    pub solver: String,
    pub settings: String,
    #[serde(deserialize_with = "empty_as_nan")]
    pub cost: f64,
    pub iterations: i64,
    #[serde(deserialize_with = "empty_as_nan")]
    pub runtime_external: f64,
    #[serde(deserialize_with = "empty_as_nan")]
    pub runtime_internal: f64,
    #[serde(deserialize_with = "empty_as_nan")]
    pub runtime_fair: f64,
    pub status: i64,
}

fn empty_as_nan<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

impl RunRecord {
    pub fn same_identity(&self, problem: &str, solver: &str, settings: &str) -> bool {
        self.problem == problem && self.solver == solver && self.settings == settings
    }

    pub fn sort_key(&self) -> (&str, &str, &str) {
        (&self.problem, &self.solver, &self.settings)
    }
}

/// Rows compare equal when every column matches; NaN costs compare equal
/// to each other so failure rows survive a round trip.
impl PartialEq for RunRecord {
    fn eq(&self, other: &Self) -> bool {
        fn same(a: f64, b: f64) -> bool {
            a == b || (a.is_nan() && b.is_nan())
        }
        self.problem == other.problem
            && self.solver == other.solver
            && self.settings == other.settings
            && same(self.cost, other.cost)
            && self.iterations == other.iterations
            && same(self.runtime_external, other.runtime_external)
            && same(self.runtime_internal, other.runtime_internal)
            && same(self.runtime_fair, other.runtime_fair)
            && self.status == other.status
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Parquet,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => Ok(TableFormat::Csv),
            Some("parquet") => Ok(TableFormat::Parquet),
            _ => Err(BenchError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TableFormat::Csv => "csv",
            TableFormat::Parquet => "parquet",
        }
    }

    pub fn read(&self, path: &Path) -> Result<Vec<RunRecord>> {
        match self {
            TableFormat::Csv => read_csv(path),
            TableFormat::Parquet => read_parquet(path),
        }
    }

    /// Writes through a sibling temp file so an interrupted write leaves the
    /// previous table intact.
    pub fn write(&self, path: &Path, rows: &[RunRecord]) -> Result<()> {
        ensure_parent_dir(path)?;
        let tmp = sibling_tmp_path(path);
        let written = match self {
            TableFormat::Csv => write_csv(&tmp, rows),
            TableFormat::Parquet => write_parquet(&tmp, rows),
        };
        if let Err(err) = written.and_then(|()| sync_file(&tmp)) {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
        fs::rename(&tmp, path)?;
        if let Some(parent) = path.parent() {
            if let Ok(dir) = fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }
}

fn sync_file(path: &Path) -> Result<()> {
    fs::OpenOptions::new().write(true).open(path)?.sync_all()?;
    Ok(())
}

fn read_csv(path: &Path) -> Result<Vec<RunRecord>> {
    let mut reader = csv::ReaderBuilder::new().from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

fn write_csv(path: &Path, rows: &[RunRecord]) -> Result<()> {
    // Header written by hand so an empty table still carries the schema.
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("problem", DataType::Utf8, false),
        Field::new("solver", DataType::Utf8, false),
        Field::new("settings", DataType::Utf8, false),
        Field::new("cost", DataType::Float64, false),
        Field::new("iterations", DataType::Int64, false),
        Field::new("runtime_external", DataType::Float64, false),
        Field::new("runtime_internal", DataType::Float64, false),
        Field::new("runtime_fair", DataType::Float64, false),
        Field::new("status", DataType::Int64, false),
    ]))
}

fn write_parquet(path: &Path, rows: &[RunRecord]) -> Result<()> {
    let schema = schema();
    let strings = |f: fn(&RunRecord) -> &str| -> ArrayRef {
        Arc::new(StringArray::from_iter_values(rows.iter().map(f)))
    };
    let floats = |f: fn(&RunRecord) -> f64| -> ArrayRef {
        Arc::new(Float64Array::from_iter_values(rows.iter().map(f)))
    };
    let ints = |f: fn(&RunRecord) -> i64| -> ArrayRef {
        Arc::new(Int64Array::from_iter_values(rows.iter().map(f)))
    };
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            strings(|r| r.problem.as_str()),
            strings(|r| r.solver.as_str()),
            strings(|r| r.settings.as_str()),
            floats(|r| r.cost),
            ints(|r| r.iterations),
            floats(|r| r.runtime_external),
            floats(|r| r.runtime_internal),
            floats(|r| r.runtime_fair),
            ints(|r| r.status),
        ],
    )?;

    let file = fs::File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn read_parquet(path: &Path) -> Result<Vec<RunRecord>> {
    let file = fs::File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch?;
        let problem = column::<StringArray>(&batch, "problem")?;
        let solver = column::<StringArray>(&batch, "solver")?;
        let settings = column::<StringArray>(&batch, "settings")?;
        let cost = column::<Float64Array>(&batch, "cost")?;
        let iterations = column::<Int64Array>(&batch, "iterations")?;
        let runtime_external = column::<Float64Array>(&batch, "runtime_external")?;
        let runtime_internal = column::<Float64Array>(&batch, "runtime_internal")?;
        let runtime_fair = column::<Float64Array>(&batch, "runtime_fair")?;
        let status = column::<Int64Array>(&batch, "status")?;
        for i in 0..batch.num_rows() {
            rows.push(RunRecord {
                problem: problem.value(i).to_string(),
                solver: solver.value(i).to_string(),
                settings: settings.value(i).to_string(),
                cost: cost.value(i),
                iterations: iterations.value(i),
                runtime_external: runtime_external.value(i),
                runtime_internal: runtime_internal.value(i),
                runtime_fair: runtime_fair.value(i),
                status: status.value(i),
            });
        }
    }
    Ok(rows)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| {
            BenchError::Arrow(arrow_schema::ArrowError::SchemaError(format!(
                "results column '{}' is missing or has the wrong type",
                name
            )))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsutil::scratch_dir;
    use std::io::Write;

    fn rows() -> Vec<RunRecord> {
        vec![
            RunRecord {
                problem: "chain_a".into(),
                solver: "FULL_CONDENSING_HPIPM".into(),
                settings: "default".into(),
                cost: 0.0,
                iterations: 12,
                runtime_external: 0.00123456789,
                runtime_internal: 0.001,
                runtime_fair: 0.0009,
                status: 0,
            },
            RunRecord {
                problem: "chain_b".into(),
                solver: "FULL_CONDENSING_QPOASES".into(),
                settings: "default".into(),
                cost: f64::NAN,
                iterations: -1,
                runtime_external: -1.0,
                runtime_internal: -1.0,
                runtime_fair: -1.0,
                status: -1,
            },
        ]
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            TableFormat::from_path(Path::new("r/results.csv")).expect("csv"),
            TableFormat::Csv
        );
        assert_eq!(
            TableFormat::from_path(Path::new("r/results.parquet")).expect("parquet"),
            TableFormat::Parquet
        );
        assert!(matches!(
            TableFormat::from_path(Path::new("r/results.xlsx")),
            Err(BenchError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn csv_keeps_exact_floats_and_nan() {
        let dir = scratch_dir("table_csv");
        let path = dir.join("results.csv");
        TableFormat::Csv.write(&path, &rows()).expect("write");
        let header = fs::read_to_string(&path).expect("read");
        assert!(header.starts_with(&COLUMNS.join(",")));
        assert_eq!(TableFormat::Csv.read(&path).expect("read back"), rows());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn empty_csv_still_has_header() {
        let dir = scratch_dir("table_empty");
        let path = dir.join("results.csv");
        TableFormat::Csv.write(&path, &[]).expect("write");
        let text = fs::read_to_string(&path).expect("read");
        assert_eq!(text.trim_end(), COLUMNS.join(","));
        assert!(TableFormat::Csv.read(&path).expect("read back").is_empty());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn csv_reads_empty_float_cells_as_nan() {
        let dir = scratch_dir("table_pandas");
        let path = dir.join("results.csv");
        let mut file = fs::File::create(&path).expect("create");
        writeln!(file, "{}", COLUMNS.join(",")).expect("header");
        writeln!(file, "chain_a,FULL_CONDENSING_HPIPM,default,0.0,12,0.00123456789,0.001,0.0009,0")
            .expect("row");
        writeln!(file, "chain_b,FULL_CONDENSING_QPOASES,default,,-1,-1.0,-1.0,-1.0,-1").expect("row");
        drop(file);
        assert_eq!(TableFormat::Csv.read(&path).expect("read"), rows());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn write_leaves_no_temp_files_behind() {
        let dir = scratch_dir("table_tmp");
        let path = dir.join("results.csv");
        TableFormat::Csv.write(&path, &rows()).expect("write");
        TableFormat::Csv.write(&path, &rows()[..1]).expect("rewrite");
        let names: Vec<String> = fs::read_dir(&dir)
            .expect("list")
            .map(|e| e.expect("entry").file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["results.csv".to_string()]);
        assert_eq!(TableFormat::Csv.read(&path).expect("read").len(), 1);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn parquet_reads_back_what_it_wrote() {
        let dir = scratch_dir("table_parquet");
        let path = dir.join("results.parquet");
        TableFormat::Parquet.write(&path, &rows()).expect("write");
        assert_eq!(TableFormat::Parquet.read(&path).expect("read back"), rows());
        TableFormat::Parquet.write(&path, &[]).expect("write empty");
        assert!(TableFormat::Parquet.read(&path).expect("read empty").is_empty());
        let _ = fs::remove_dir_all(dir);
    }
}
