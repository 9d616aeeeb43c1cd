//! Parameter rows in, result rows out.
//!
//! A [`ParameterRecord`] is one node of the inventory network as it appears in the
//! external table. Every numeric field is optional; missing or non-finite entries load
//! as `0.0` so one bad row never aborts a batch (the zero scale then fails that cell's
//! tasks, which are reported individually).

use std::io::{Read, Write};

use super::{CellAddress, CellInputs, CellStatus, ParameterCell};
use crate::core::EngineError;

/// Raw parameters for one cell.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ParameterRecord {
    pub sheet: String,
    pub row: usize,
    pub column: usize,
    pub mu_x: Option<f64>,
    pub sigma_x: Option<f64>,
    pub mu_x_secondary: Option<f64>,
    pub sigma_x_secondary: Option<f64>,
    pub mu_y: Option<f64>,
    pub sigma_y: Option<f64>,
    pub mu_x_reference: Option<f64>,
    pub sigma_x_reference: Option<f64>,
    pub sigma_y_reference: Option<f64>,
    pub reorder_threshold: Option<f64>,
    pub reference_threshold: Option<f64>,
}

#[inline]
fn or_zero(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

impl ParameterRecord {
    pub fn address(&self) -> CellAddress {
        CellAddress {
            sheet: self.sheet.clone(),
            row: self.row,
            column: self.column,
        }
    }

    pub fn inputs(&self) -> CellInputs {
        CellInputs {
            mu_x: or_zero(self.mu_x),
            sigma_x: or_zero(self.sigma_x),
            mu_x_secondary: or_zero(self.mu_x_secondary),
            sigma_x_secondary: or_zero(self.sigma_x_secondary),
            mu_y: or_zero(self.mu_y),
            sigma_y: or_zero(self.sigma_y),
            mu_x_reference: or_zero(self.mu_x_reference),
            sigma_x_reference: or_zero(self.sigma_x_reference),
            sigma_y_reference: or_zero(self.sigma_y_reference),
            reorder_threshold: or_zero(self.reorder_threshold),
            reference_threshold: or_zero(self.reference_threshold),
        }
    }

    pub fn into_cell(self) -> ParameterCell {
        ParameterCell::new(self.address(), self.inputs())
    }
}

/// Committed output for one cell. Only the scalars computed in the run's mode are set.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResultRow {
    #[serde(flatten)]
    pub address: CellAddress,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_probability: Option<f64>,
    pub status: CellStatus,
}

/// Where parameter records come from.
pub trait ParameterSource {
    fn load(&mut self) -> Result<Vec<ParameterRecord>, EngineError>;
}

/// Where committed rows go. Called once per batch.
pub trait ResultSink {
    fn write_batch(&mut self, rows: &[ResultRow]) -> Result<(), EngineError>;
}

impl ParameterSource for Vec<ParameterRecord> {
    fn load(&mut self) -> Result<Vec<ParameterRecord>, EngineError> {
        Ok(std::mem::take(self))
    }
}

/// Reads a JSON array of [`ParameterRecord`]s.
#[derive(Debug)]
pub struct JsonParameterSource<R> {
    reader: R,
}

impl<R: Read> JsonParameterSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: Read> ParameterSource for JsonParameterSource<R> {
    fn load(&mut self) -> Result<Vec<ParameterRecord>, EngineError> {
        Ok(serde_json::from_reader(&mut self.reader)?)
    }
}

/// Keeps every committed batch in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub batches: Vec<Vec<ResultRow>>,
}

impl ResultSink for MemorySink {
    fn write_batch(&mut self, rows: &[ResultRow]) -> Result<(), EngineError> {
        self.batches.push(rows.to_vec());
        Ok(())
    }
}

/// Writes each batch as a pretty-printed JSON array.
#[derive(Debug)]
pub struct JsonResultSink<W> {
    writer: W,
}

impl<W: Write> JsonResultSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ResultSink for JsonResultSink<W> {
    fn write_batch(&mut self, rows: &[ResultRow]) -> Result<(), EngineError> {
        serde_json::to_writer_pretty(&mut self.writer, rows)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_and_non_finite_fields_load_as_zero() {
        let json = r#"[
            { "sheet": "Plan1", "row": 3, "column": 7, "mu_x": 100.0, "sigma_x": null,
              "mu_y": 30.0 }
        ]"#;
        let mut source = JsonParameterSource::new(json.as_bytes());
        let records = source.load().unwrap();
        assert_eq!(records.len(), 1);

        let mut record = records[0].clone();
        record.sigma_y = Some(f64::NAN);
        let inputs = record.inputs();
        assert_eq!(inputs.mu_x, 100.0);
        assert_eq!(inputs.sigma_x, 0.0);
        assert_eq!(inputs.sigma_y, 0.0);
        assert_eq!(inputs.reference_threshold, 0.0);

        let cell = record.into_cell();
        assert_eq!(cell.address.sheet, "Plan1");
        assert_eq!((cell.address.row, cell.address.column), (3, 7));
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let mut source = JsonParameterSource::new("{ not json".as_bytes());
        assert!(matches!(source.load(), Err(EngineError::Serialization(_))));
    }

    #[test]
    fn json_sink_writes_only_computed_fields() {
        let row = ResultRow {
            address: CellAddress {
                sheet: "S".to_string(),
                row: 1,
                column: 2,
            },
            threshold: Some(42.0),
            std_dev: Some(3.0),
            probability: None,
            reference_probability: None,
            status: CellStatus::Ok,
        };
        let mut sink = JsonResultSink::new(Vec::new());
        sink.write_batch(std::slice::from_ref(&row)).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert!(text.contains("\"threshold\": 42.0"));
        assert!(!text.contains("probability"));

        let parsed: Vec<ResultRow> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, vec![row]);
    }

    #[test]
    fn vec_source_hands_over_its_records() {
        let mut source = vec![ParameterRecord::default(), ParameterRecord::default()];
        assert_eq!(source.load().unwrap().len(), 2);
        assert!(source.load().unwrap().is_empty());
    }
}
