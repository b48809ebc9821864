use crate::error::ChatError;
use crate::models::SourceDocument;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Lists `*.pdf` files directly inside `folder`, sorted by path. Subdirectories are not visited.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// Reads every PDF in `folder` into memory as one upload batch.
///
/// A missing folder is an I/O error; a folder without PDFs yields an empty batch, which the
/// session later rejects as an empty corpus.
pub fn load_documents(folder: &Path) -> Result<Vec<SourceDocument>, ChatError> {
    if !folder.is_dir() {
        return Err(ChatError::InvalidConfig(format!(
            "{} is not a directory",
            folder.display()
        )));
    }

    discover_pdf_files(folder)
        .into_iter()
        .map(|path| {
            let bytes = fs::read(&path)?;
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            debug!(document = %name, bytes = bytes.len(), "loaded pdf");
            Ok(SourceDocument::new(name, bytes))
        })
        .collect()
}
