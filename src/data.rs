//! JSON merge data for the command line tool.

use std::path::Path;

use anyhow::{anyhow, Context};
use serde_json::{Map, Value};

use crate::docx::document::Docx;

pub type Row = Vec<(String, String)>;

/// Scalar values plus row sets, in key order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeData {
    pub values: Vec<(String, String)>,
    /// `mark -> rows`: the row holding `mark` is cloned once per entry.
    pub rows: Vec<(String, Vec<Row>)>,
}

impl MergeData {
    /// Parses `arg` as JSON, or failing that, reads it as a path to a JSON file.
    pub fn from_arg(arg: &str) -> anyhow::Result<Self> {
        match serde_json::from_str::<Value>(arg) {
            Ok(v) => Self::from_value(v),
            Err(_) => {
                let path = Path::new(arg);
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("data is neither JSON nor a readable file: {arg}"))?;
                let v: Value = serde_json::from_str(&text)
                    .with_context(|| format!("parse data file: {}", path.display()))?;
                Self::from_value(v)
            }
        }
    }

    pub fn from_value(v: Value) -> anyhow::Result<Self> {
        let Value::Object(map) = v else {
            return Err(anyhow!("merge data must be a JSON object"));
        };
        let mut data = Self::default();
        for (key, value) in map {
            match value {
                Value::Array(items) => {
                    let rows = items
                        .into_iter()
                        .enumerate()
                        .map(|(i, item)| match item {
                            Value::Object(fields) => row_from_object(fields)
                                .with_context(|| format!("{key}[{i}]")),
                            _ => Err(anyhow!("{key}[{i}]: row must be a JSON object")),
                        })
                        .collect::<anyhow::Result<Vec<_>>>()?;
                    data.rows.push((key, rows));
                }
                other => {
                    let text = scalar_text(&other).with_context(|| format!("value of {key}"))?;
                    data.values.push((key, text));
                }
            }
        }
        Ok(data)
    }

    /// Clones rows first, then sets the scalar values. Returns the number of replacements.
    pub fn apply(&self, doc: &mut Docx) -> crate::Result<usize> {
        let mut total = 0;
        for (mark, rows) in &self.rows {
            total += doc.clone_row_with_values(mark, rows.iter().cloned())?;
        }
        total += doc.set_values(self.values.iter().map(|(k, v)| (k, v)))?;
        Ok(total)
    }
}

fn row_from_object(fields: Map<String, Value>) -> anyhow::Result<Row> {
    fields
        .into_iter()
        .map(|(k, v)| {
            let text = scalar_text(&v).with_context(|| format!("field {k}"))?;
            Ok((k, text))
        })
        .collect()
}

fn scalar_text(v: &Value) -> anyhow::Result<String> {
    match v {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(_) | Value::Object(_) => Err(anyhow!("expected text, number, bool or null")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_scalars_and_rows() {
        let data = MergeData::from_arg(
            r#"{"name":"Ada","total":12.5,"paid":true,"note":null,
                "item":[{"item":"Pen","qty":2},{"item":"Ink","qty":1}]}"#,
        )
        .expect("parse");
        assert_eq!(
            data.values,
            vec![
                ("name".to_string(), "Ada".to_string()),
                ("note".to_string(), String::new()),
                ("paid".to_string(), "true".to_string()),
                ("total".to_string(), "12.5".to_string()),
            ]
        );
        assert_eq!(data.rows.len(), 1);
        assert_eq!(data.rows[0].0, "item");
        assert_eq!(data.rows[0].1[1], vec![
            ("item".to_string(), "Ink".to_string()),
            ("qty".to_string(), "1".to_string()),
        ]);
    }

    #[test]
    fn rejects_nested_objects() {
        let err = MergeData::from_arg(r#"{"a":{"b":1}}"#).unwrap_err();
        assert!(format!("{err:#}").contains("value of a"));
    }

    #[test]
    fn reads_data_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"{"k":"v"}"#).unwrap();
        let data = MergeData::from_arg(path.to_str().unwrap()).expect("file");
        assert_eq!(data.values, vec![("k".to_string(), "v".to_string())]);
    }
}
