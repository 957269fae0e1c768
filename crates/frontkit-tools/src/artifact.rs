//! Writing build outputs, with an optional gzipped sibling.

use crate::error::ToolError;
use camino::{Utf8Path, Utf8PathBuf};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::fs;
use std::io::Write;
use tracing::debug;

/// What [`write_artifact`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactReport {
    /// The written file.
    pub path: Utf8PathBuf,
    /// Size of the file in bytes.
    pub bytes: u64,
    /// Size of the `.gz` sibling, when one was requested.
    pub gzip_bytes: Option<u64>,
    /// `false` when the file already had this content and was left alone.
    pub written: bool,
}

impl ArtifactReport {
    /// Path of the gzipped sibling.
    pub fn gzip_path(&self) -> Utf8PathBuf {
        gzip_path(&self.path)
    }
}

/// Writes `contents` to `path`, creating parent directories.
///
/// The file is only rewritten when its content changed, which keeps
/// modification times stable for downstream watchers. With `gzip` set, a
/// `<path>.gz` copy is kept alongside.
pub fn write_artifact(
    path: &Utf8Path,
    contents: &[u8],
    gzip: bool,
) -> Result<ArtifactReport, ToolError> {
    if let Some(parent) = path.parent() {
        if !parent.as_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| ToolError::io(parent, e))?;
        }
    }

    let gz_path = gzip_path(path);
    let unchanged = same_content(path, contents) && (!gzip || gz_path.is_file());

    if !unchanged {
        fs::write(path, contents).map_err(|e| ToolError::io(path, e))?;
    }

    let gzip_bytes = if !gzip {
        None
    } else if unchanged {
        let meta = fs::metadata(&gz_path).map_err(|e| ToolError::io(&gz_path, e))?;
        Some(meta.len())
    } else {
        let compressed = gzip_bytes(contents)?;
        fs::write(&gz_path, &compressed).map_err(|e| ToolError::io(&gz_path, e))?;
        Some(compressed.len() as u64)
    };

    debug!(path = %path, written = !unchanged, "artifact");

    Ok(ArtifactReport {
        path: path.to_owned(),
        bytes: contents.len() as u64,
        gzip_bytes,
        written: !unchanged,
    })
}

/// Compresses `data` with gzip at the default level.
pub fn gzip_bytes(data: &[u8]) -> Result<Vec<u8>, ToolError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| ToolError::io("<gzip>", e))
}

fn gzip_path(path: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{path}.gz"))
}

/// Returns whether `path` already holds exactly `contents`. A size mismatch
/// is settled from metadata without reading the file.
fn same_content(path: &Utf8Path, contents: &[u8]) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.len() == contents.len() as u64 => {}
        _ => return false,
    }
    fs::read(path).is_ok_and(|existing| existing == contents)
}
