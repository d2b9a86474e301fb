// Catalog loading from JSON / JSON-lines files
use anyhow::{anyhow, Context, Result};
use homefind_core::{Catalog, CatalogEntry};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    /// A single JSON array of rows.
    Json,
    /// One JSON object per line.
    JsonLines,
}

impl CatalogFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(CatalogFormat::Json),
            Some("jsonl") | Some("ndjson") => Ok(CatalogFormat::JsonLines),
            other => Err(anyhow!(
                "Unsupported catalog format {:?} for {}: expected .json, .jsonl or .ndjson",
                other,
                path.display()
            )),
        }
    }
}

/// Load and validate a catalog file. The format follows the file extension.
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Catalog> {
    let path = path.as_ref();
    let format = CatalogFormat::from_path(path)?;
    let file = File::open(path)
        .with_context(|| format!("Failed to open catalog {}", path.display()))?;
    let reader = BufReader::new(file);

    let entries = match format {
        CatalogFormat::Json => serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse catalog {}", path.display()))?,
        CatalogFormat::JsonLines => read_json_lines(reader, path)?,
    };

    let catalog = Catalog::new(entries)?;
    info!(
        path = %path.display(),
        rows = catalog.len(),
        names = catalog.distinct_names(),
        "Loaded catalog"
    );
    Ok(catalog)
}

fn read_json_lines<R: BufRead>(reader: R, path: &Path) -> Result<Vec<CatalogEntry>> {
    let mut entries = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: CatalogEntry = serde_json::from_str(&line).with_context(|| {
            format!("Failed to parse {} line {}", path.display(), line_no + 1)
        })?;
        entries.push(entry);
    }
    Ok(entries)
}
