//! Filename derivation and the file-save collaborator for downloads.

use std::fs;
use std::path::{Path, PathBuf};

/// Persists a downloaded body. Fire-and-forget: failures are the saver's
/// concern and never change the request outcome.
pub trait FileSaver: Send + Sync {
    fn save(&self, data: &[u8], filename: &str);
}

/// Writes downloads into a directory.
///
/// Only the final path component of the filename is kept, so a hostile
/// `Content-Disposition` cannot escape the directory.
#[derive(Debug, Clone)]
pub struct DirectorySaver {
    dir: PathBuf,
}

impl DirectorySaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a download named `filename` is written to.
    pub fn target_path(&self, filename: &str) -> PathBuf {
        let name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or("download");
        self.dir.join(name)
    }
}

impl FileSaver for DirectorySaver {
    fn save(&self, data: &[u8], filename: &str) {
        let path = self.target_path(filename);
        match fs::create_dir_all(&self.dir).and_then(|()| fs::write(&path, data)) {
            Ok(()) => tracing::debug!(path = %path.display(), bytes = data.len(), "saved download"),
            Err(err) => tracing::warn!(path = %path.display(), error = %err, "failed to save download"),
        }
    }
}

/// Derive a download filename.
///
/// An `attachment` disposition is consulted first (`filename*=` then
/// `filename=`), then the last URL path segment without query or fragment,
/// then the literal `download`. The result is percent-decoded.
pub fn filename_from_disposition(disposition: Option<&str>, url: &str) -> String {
    let from_header = disposition
        .filter(|d| d.contains("attachment"))
        .and_then(parse_disposition_filename);

    let filename = from_header
        .or_else(|| {
            let segment = url.rsplit('/').next().unwrap_or(url);
            let segment = segment.split(['?', '#']).next().unwrap_or("");
            (!segment.is_empty()).then(|| segment.to_string())
        })
        .unwrap_or_else(|| "download".to_string());

    match urlencoding::decode(&filename) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => filename,
    }
}

fn parse_disposition_filename(header: &str) -> Option<String> {
    // RFC 5987: filename*=charset'language'value
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + "filename*=".len()..].trim_start();
        let value = value.split(';').next().unwrap_or("").trim().trim_matches('"');
        let encoded = match value.find("''") {
            Some(idx) => &value[idx + 2..],
            None => value,
        };
        if !encoded.is_empty() {
            return Some(encoded.to_string());
        }
    }

    let mut rest = header;
    while let Some(pos) = rest.find("filename=") {
        let value = rest[pos + "filename=".len()..].trim_start();
        rest = &rest[pos + "filename=".len()..];
        let candidate = match value.strip_prefix(['"', '\'']) {
            Some(stripped) => {
                let quote = value.as_bytes()[0] as char;
                stripped.split(quote).next().unwrap_or("")
            }
            None => value.split(';').next().unwrap_or("").trim(),
        };
        let candidate = candidate.replace(['"', '\''], "");
        if !candidate.is_empty() {
            return Some(candidate);
        }
    }
    None
}
