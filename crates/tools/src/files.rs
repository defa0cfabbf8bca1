//! Local-file tools: `read_document` and `analyze_csv`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use fathom_domain::error::{Error, Result};
use fathom_providers::DocReader;

use crate::registry::Tool;

/// Cap on document text returned to the model, in characters.
const MAX_DOC_CHARS: usize = 20_000;

#[derive(Deserialize)]
struct PathArgs {
    path: PathBuf,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// read_document
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ReadDocumentTool {
    reader: Arc<dyn DocReader>,
}

impl ReadDocumentTool {
    pub fn new(reader: Arc<dyn DocReader>) -> Self {
        Self { reader }
    }
}

#[async_trait::async_trait]
impl Tool for ReadDocumentTool {
    fn name(&self) -> &str {
        "read_document"
    }

    fn description(&self) -> &str {
        "Read a local text document. Args: {\"path\": \"...\"}"
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let args: PathArgs =
            serde_json::from_value(args).map_err(|e| Error::tool("read_document", e.to_string()))?;
        let mut text = self.reader.read(&args.path).await?;
        if text.chars().count() > MAX_DOC_CHARS {
            text = text.chars().take(MAX_DOC_CHARS).collect();
            text.push_str("\n[truncated]");
        }
        Ok(text)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// analyze_csv
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Summarises a delimited file: row count, columns, and per-column
/// value diversity.
pub struct AnalyzeCsvTool;

#[async_trait::async_trait]
impl Tool for AnalyzeCsvTool {
    fn name(&self) -> &str {
        "analyze_csv"
    }

    fn description(&self) -> &str {
        "Summarise a CSV file's columns, row count, and value diversity. Args: {\"path\": \"...\"}"
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let args: PathArgs =
            serde_json::from_value(args).map_err(|e| Error::tool("analyze_csv", e.to_string()))?;

        let mut reader = csv::Reader::from_path(&args.path)
            .map_err(|e| Error::tool("analyze_csv", e.to_string()))?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| Error::tool("analyze_csv", e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut row_count: usize = 0;
        let mut distinct: Vec<HashSet<String>> = vec![HashSet::new(); headers.len()];
        let mut samples: Vec<Option<String>> = vec![None; headers.len()];

        for record in reader.records() {
            let record = record.map_err(|e| Error::tool("analyze_csv", e.to_string()))?;
            row_count += 1;
            for (i, field) in record.iter().enumerate().take(headers.len()) {
                distinct[i].insert(field.to_string());
                if samples[i].is_none() && !field.is_empty() {
                    samples[i] = Some(field.to_string());
                }
            }
        }

        let mut out = format!(
            "CSV {}: {} rows, {} columns\n",
            args.path.display(),
            row_count,
            headers.len()
        );
        for (i, header) in headers.iter().enumerate() {
            let diversity = if row_count == 0 {
                0.0
            } else {
                distinct[i].len() as f64 / row_count as f64
            };
            out.push_str(&format!(
                "- {}: {} distinct values (diversity {:.2}){}\n",
                header,
                distinct[i].len(),
                diversity,
                samples[i]
                    .as_deref()
                    .map(|s| format!(", e.g. \"{s}\""))
                    .unwrap_or_default()
            ));
        }
        Ok(out)
    }
}
