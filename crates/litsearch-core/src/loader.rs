use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::types::Document;

const DEFAULT_SOURCE: &str = "misc";

/// Reads structured documents from `.jsonl` (one per line) and `.json`
/// (one document or an array) files under a directory tree.
#[derive(Debug, Default)]
pub struct DocumentLoader {
    limit: Option<usize>,
}

impl DocumentLoader {
    pub fn new() -> Self { Self::default() }

    /// Stops after this many files.
    pub fn with_file_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn load_directory(&self, data_dir: &Path) -> Result<Vec<Document>> {
        let mut files = self.list_document_files(data_dir);
        if files.is_empty() {
            warn!(dir = %data_dir.display(), "no .jsonl or .json files found");
            return Ok(vec![]);
        }
        if let Some(limit) = self.limit {
            if files.len() > limit {
                files.truncate(limit);
                info!(limit, "limited to first files");
            }
        }
        let mut documents = Vec::new();
        for (file_index, file_path) in files.iter().enumerate() {
            info!(file = %file_path.display(), n = file_index + 1, of = files.len(), "loading documents");
            let source = self.source_from_path(file_path, data_dir);
            let mut loaded = self.load_file(file_path)?;
            for doc in &mut loaded {
                if doc.source.is_empty() {
                    doc.source.clone_from(&source);
                }
            }
            documents.extend(loaded);
        }
        info!(files = files.len(), documents = documents.len(), "loaded document files");
        Ok(documents)
    }

    /// Parses one file. Bad lines in a `.jsonl` file are logged and skipped.
    pub fn load_file(&self, file_path: &Path) -> Result<Vec<Document>> {
        let content = fs::read_to_string(file_path).with_context(|| format!("reading {}", file_path.display()))?;
        if file_path.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            let mut docs = Vec::new();
            for (n, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() { continue; }
                match serde_json::from_str::<Document>(line) {
                    Ok(doc) => docs.push(doc),
                    Err(e) => warn!(file = %file_path.display(), line = n + 1, error = %e, "skipping malformed document"),
                }
            }
            return Ok(docs);
        }
        let value: serde_json::Value = serde_json::from_str(&content).with_context(|| format!("parsing {}", file_path.display()))?;
        let docs = if value.is_array() { serde_json::from_value(value)? } else { vec![serde_json::from_value(value)?] };
        Ok(docs)
    }

    /// The file's directory relative to `data_dir`, used as the partition tag.
    fn source_from_path(&self, file_path: &Path, data_dir: &Path) -> String {
        let relative_path = file_path.strip_prefix(data_dir).unwrap_or(file_path);
        match relative_path.parent().and_then(|p| p.to_str()) {
            Some(dir) if !dir.is_empty() => dir.to_string(),
            _ => DEFAULT_SOURCE.to_string(),
        }
    }

    fn list_document_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path();
            if matches!(path.extension().and_then(|s| s.to_str()), Some("jsonl" | "json")) { files.push(path.to_path_buf()); }
        }
        files.sort(); files
    }
}
