//! Managed audio directory.
//!
//! Every generated speech file lives in one directory. Names handed in from
//! the outside are reduced to a safe basename before they touch the
//! filesystem, so nothing outside the directory is ever read or written.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// Suffix of a file still being written.
pub const PARTIAL_SUFFIX: &str = ".part";

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.-]").expect("valid regex"));

/// Reduce a user-supplied filename to a safe basename.
///
/// Non-ASCII characters are decomposed and dropped, path separators become
/// word breaks, whitespace runs become `_`, anything outside
/// `[A-Za-z0-9_.-]` is removed and leading/trailing `.`/`_` are trimmed.
/// Returns `None` when nothing usable is left.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let ascii: String = name.nfkd().filter(char::is_ascii).collect();
    let separated = ascii.replace(|c: char| c == '/' || c == '\\', " ");
    let joined = separated.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = UNSAFE_CHARS.replace_all(&joined, "");
    let trimmed = cleaned.trim_matches(|c: char| c == '.' || c == '_');

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Whether `path` names a file that is still being written.
pub fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(PARTIAL_SUFFIX))
}

/// Handle to the managed audio directory.
#[derive(Debug, Clone)]
pub struct AudioStore {
    dir: PathBuf,
}

impl AudioStore {
    /// Open the directory, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fresh name for a generated file: `tts_<uuid hex>.mp3`.
    pub fn new_file_name() -> String {
        format!("tts_{}.mp3", Uuid::new_v4().simple())
    }

    /// Map an outside filename to a path inside the directory.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        sanitize_filename(name).map(|safe| self.dir.join(safe))
    }

    /// Like [`resolve`](Self::resolve), but only for finished files that
    /// exist. In-flight `.part` files are never handed out.
    pub async fn find(&self, name: &str) -> Option<PathBuf> {
        let path = self.resolve(name)?;
        if is_partial(&path) {
            return None;
        }
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }

    /// Write `bytes` under `name`, returning the sanitized name used.
    ///
    /// Data goes to a `.part` sibling first and is renamed into place, so a
    /// concurrent reader never sees a half-written file.
    pub async fn write(&self, name: &str, bytes: &[u8]) -> io::Result<String> {
        let safe = sanitize_filename(name).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("unusable filename: {name:?}"))
        })?;
        let target = self.dir.join(&safe);
        let partial = self.dir.join(format!("{safe}{PARTIAL_SUFFIX}"));

        tokio::fs::write(&partial, bytes).await?;
        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
        Ok(safe)
    }
}
