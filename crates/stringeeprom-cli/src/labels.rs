//! Entry label configuration
//!
//! Labels come from an optional text file, one label per line, mapped
//! positionally onto the device table. Blank lines and positions past the
//! end of the file fall back to the 1-based position number. The engine
//! never sees the file; it only gets the merged label function.

use std::path::Path;

/// Read the label file, if present. A missing file is not an error.
pub fn load_labels(path: &Path) -> Option<Vec<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            tracing::info!(path = %path.display(), "label file loaded");
            Some(text.lines().map(str::to_string).collect())
        }
        Err(_) => {
            tracing::info!(path = %path.display(), "no label file, using position numbers");
            None
        }
    }
}

/// Build the labeler handed to the engine: configured label when present
/// and non-blank, position number otherwise.
pub fn make_labeler(labels: Option<Vec<String>>) -> impl Fn(usize) -> String + Send + Sync {
    move |position| {
        labels
            .as_ref()
            .and_then(|l| l.get(position - 1))
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| position.to_string())
    }
}
