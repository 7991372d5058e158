//! Source text extraction
//!
//! Pulls plain text out of an uploaded original. PDFs go through
//! `pdf-extract`; anything else is read as UTF-8 text.

use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("PDF text extraction failed for {path}: {message}")]
    Pdf { path: String, message: String },
}

/// Extract plain text from an original artifact.
pub fn extract_text(path: &Path) -> Result<String, ExtractError> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    let text = if is_pdf {
        pdf_extract::extract_text(path).map_err(|e| ExtractError::Pdf {
            path: path.display().to_string(),
            message: e.to_string(),
        })?
    } else {
        std::fs::read_to_string(path).map_err(|e| ExtractError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?
    };

    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_plain_text_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "  Hello world.  \n").unwrap();

        assert_eq!(extract_text(&path).unwrap(), "Hello world.");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = extract_text(Path::new("/nonexistent/input.txt")).unwrap_err();
        assert!(matches!(err, ExtractError::Read { .. }));
    }
}
