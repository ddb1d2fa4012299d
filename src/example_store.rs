//! Loads labeled examples for few-shot prompts.
//!
//! Three interchangeable file formats are supported, picked by extension:
//! line-delimited JSON (`.jsonl`, `.ndjson`), a JSON array (`.json`) and a
//! YAML sequence (`.yaml`, `.yml`). Every record is `{text, label}`.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::LabelSet;
use crate::error::{PipelineError, Result};

/// One `(text, label)` pair. The label is always spelled as in the label set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledExample {
    text: String,
    label: String,
}

impl LabeledExample {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

#[derive(Debug, Deserialize)]
struct ExampleRecord {
    text: String,
    label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExampleFormat {
    JsonLines,
    JsonArray,
    Yaml,
}

impl ExampleFormat {
    fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("jsonl") | Some("ndjson") => Ok(ExampleFormat::JsonLines),
            Some("json") => Ok(ExampleFormat::JsonArray),
            Some("yaml") | Some("yml") => Ok(ExampleFormat::Yaml),
            _ => Err(PipelineError::Configuration(format!(
                "unsupported examples file format for {}: expected .jsonl, .json, .yaml or .yml",
                path.display()
            ))),
        }
    }

    /// Splits the file into per-record parse results, keeping record order.
    /// A blank file holds no records in every format.
    fn parse(self, contents: &str) -> Result<Vec<std::result::Result<ExampleRecord, String>>> {
        if contents.trim().is_empty() {
            return Ok(vec![]);
        }
        match self {
            ExampleFormat::JsonLines => Ok(contents
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| serde_json::from_str::<ExampleRecord>(line).map_err(|e| e.to_string()))
                .collect()),
            ExampleFormat::JsonArray => {
                let values: Vec<serde_json::Value> = serde_json::from_str(contents)
                    .map_err(|e| {
                        PipelineError::Validation(format!(
                            "examples file is not a JSON array of records: {e}"
                        ))
                    })?;
                Ok(values
                    .into_iter()
                    .map(|value| serde_json::from_value(value).map_err(|e| e.to_string()))
                    .collect())
            }
            ExampleFormat::Yaml => {
                let values: Vec<serde_yaml::Value> = serde_yaml::from_str(contents)
                    .map_err(|e| {
                        PipelineError::Validation(format!(
                            "examples file is not a YAML sequence of records: {e}"
                        ))
                    })?;
                Ok(values
                    .into_iter()
                    .map(|value| serde_yaml::from_value(value).map_err(|e| e.to_string()))
                    .collect())
            }
        }
    }
}

/// Reads the examples at `path`. No path means zero-shot: an empty sequence.
pub fn load_examples(path: Option<&Path>, labels: &LabelSet) -> Result<Vec<LabeledExample>> {
    let Some(path) = path else {
        debug!("no examples file given, running zero-shot");
        return Ok(vec![]);
    };
    let format = ExampleFormat::from_path(path)?;
    let contents = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::Validation(format!(
            "could not read examples file {}: {e}",
            path.display()
        ))
    })?;
    let examples = parse_examples(&contents, format, labels)?;
    info!(path = %path.display(), count = examples.len(), ?format, "loaded examples");
    Ok(examples)
}

fn parse_examples(
    contents: &str,
    format: ExampleFormat,
    labels: &LabelSet,
) -> Result<Vec<LabeledExample>> {
    format
        .parse(contents)?
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            let record =
                record.map_err(|reason| PipelineError::InvalidExample { index, reason })?;
            validate_record(index, record, labels)
        })
        .collect()
}

fn validate_record(index: usize, record: ExampleRecord, labels: &LabelSet) -> Result<LabeledExample> {
    let text = record.text.trim();
    if text.is_empty() {
        return Err(PipelineError::InvalidExample {
            index,
            reason: String::from("text must not be empty"),
        });
    }
    let label = labels
        .find(&record.label)
        .ok_or_else(|| PipelineError::InvalidExample {
            index,
            reason: format!("label `{}` is not one of: {}", record.label, labels),
        })?;
    Ok(LabeledExample {
        text: text.to_string(),
        label: label.to_string(),
    })
}
