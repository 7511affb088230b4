//! Output store: file naming, atomic image saving, and format conversion.

use std::borrow::Cow;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::error::StorageError;
use crate::params::OutputFormat;
use crate::ports::GeneratedImage;

/// Upper bound on name collisions tolerated for a single save.
const MAX_NAME_ATTEMPTS: usize = 1024;

/// Persists generated images under unique names in one directory.
///
/// Bytes are written to a temporary file inside the directory and then
/// hard-linked into place with a no-clobber rename, so a final name either
/// holds a complete image or does not exist. Names combine a prompt slug, a
/// UTC timestamp and a process-wide sequence number; a name that already
/// exists on disk is skipped, never overwritten.
#[derive(Debug)]
pub struct OutputStore {
    dir: PathBuf,
    next_seq: AtomicU64,
}

impl OutputStore {
    /// Create a store rooted at `dir`. Nothing is touched on disk yet.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), next_seq: AtomicU64::new(1) }
    }

    /// The directory images are written to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the output directory if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_dir(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|source| StorageError { path: self.dir.clone(), source })
    }

    /// Write `data` under a fresh name derived from `stem` and return its path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is not writable or the disk is full.
    /// No file is left under a final name on failure.
    pub fn save(&self, data: &[u8], stem: &str, extension: &str) -> Result<PathBuf, StorageError> {
        self.ensure_dir()?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".incoming-")
            .suffix(".part")
            .tempfile_in(&self.dir)
            .map_err(|source| StorageError { path: self.dir.clone(), source })?;

        tmp.write_all(data)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|source| StorageError { path: tmp.path().to_path_buf(), source })?;

        let slug = sanitize_for_filename(stem, 40);
        let timestamp = Utc::now().format("%Y%m%dT%H%M%S");

        for _ in 0..MAX_NAME_ATTEMPTS {
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            let path = self.dir.join(format!("{slug}-{timestamp}-{seq:06}.{extension}"));
            match tmp.persist_noclobber(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => tmp = e.file,
                Err(e) => return Err(StorageError { path, source: e.error }),
            }
        }

        Err(StorageError {
            path: self.dir.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free output name after repeated collisions",
            ),
        })
    }
}

/// Sanitize a string for use in a filename.
///
/// Converts to lowercase, replaces non-alphanumeric chars with hyphens,
/// collapses consecutive hyphens, and trims to max length.
#[must_use]
pub fn sanitize_for_filename(input: &str, max_len: usize) -> String {
    let mut result = String::with_capacity(max_len);
    let mut last_was_hyphen = true; // Prevents leading hyphen

    for ch in input.chars().take(max_len * 2) {
        if result.len() >= max_len {
            break;
        }
        if ch.is_ascii_alphanumeric() {
            result.push(ch.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            result.push('-');
            last_was_hyphen = true;
        }
    }

    while result.ends_with('-') {
        result.pop();
    }

    if result.is_empty() {
        "image".to_string()
    } else {
        result
    }
}

/// Return the image bytes encoded as `format`, re-encoding only when the
/// engine produced a different MIME type.
///
/// # Errors
///
/// Returns an error if the bytes cannot be decoded or re-encoded.
pub fn encode_as(image: &GeneratedImage, format: OutputFormat) -> Result<Cow<'_, [u8]>, String> {
    if format.matches_mime(&image.mime_type) {
        return Ok(Cow::Borrowed(&image.data));
    }

    let decoded = image::load_from_memory(&image.data)
        .map_err(|e| format!("Failed to decode {} image: {e}", image.mime_type))?;

    // JPEG has no alpha channel.
    let decoded = if format == OutputFormat::Jpeg {
        image::DynamicImage::ImageRgb8(decoded.to_rgb8())
    } else {
        decoded
    };

    let mut buf = Cursor::new(Vec::new());
    decoded
        .write_to(&mut buf, format.image_format())
        .map_err(|e| format!("Failed to encode as {format}: {e}"))?;
    Ok(Cow::Owned(buf.into_inner()))
}
