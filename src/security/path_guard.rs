//! Upload path validation.
//!
//! # Responsibilities
//! - Normalize the requested path and strip leading `../` runs
//! - Restrict access to the fixed set of resource directories
//! - Confirm a backing file exists under the upload root
//! - Confirm the resolved file did not escape the upload root (symlinks)
//!
//! # Design Decisions
//! - The allow-list is a closed, compile-time set
//! - Rejections never reveal which prefixes are valid
//! - A failing stat is reported as "not found", never as an error

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;

use crate::error::GuardError;

/// Resource directories that may be served from the upload root.
pub const ALLOWED_PREFIXES: [&str; 4] = ["/videos/", "/pdfs/", "/lectures/", "/gallery/"];

/// Collapse a request path to canonical form.
///
/// Only `/` separates segments. `.` and empty segments are dropped, `..`
/// consumes the preceding segment, and a `..` at the root of an absolute
/// path is discarded. Any leading run of `../` left over on a
/// relative path is stripped, so the result never starts with `../`.
pub fn normalize_request_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let trailing_slash = path.len() > 1 && path.ends_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            name => segments.push(name),
        }
    }

    let first_named = segments.iter().position(|s| *s != "..").unwrap_or(segments.len());
    let segments = &segments[first_named..];

    let mut normalized = String::with_capacity(path.len());
    if absolute {
        normalized.push('/');
    }
    normalized.push_str(&segments.join("/"));
    if trailing_slash && !segments.is_empty() {
        normalized.push('/');
    }
    normalized
}

/// Returns true if the normalized path sits under an allowed directory.
pub fn is_allowed(normalized: &str) -> bool {
    ALLOWED_PREFIXES
        .iter()
        .any(|prefix| normalized.starts_with(prefix))
}

/// Validates requested paths against the upload root.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
    strict_containment: bool,
}

impl PathGuard {
    /// Create a guard for `root`. The root is canonicalized once here.
    pub fn new(root: impl AsRef<Path>, strict_containment: bool) -> Result<Self, GuardError> {
        let root = std::fs::canonicalize(root.as_ref()).map_err(GuardError::UploadRoot)?;
        if !root.is_dir() {
            return Err(GuardError::UploadRoot(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            )));
        }
        Ok(Self {
            root,
            strict_containment,
        })
    }

    /// The canonical upload root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate a raw request path, returning the file it resolves to.
    pub async fn validate(&self, raw_path: &str) -> Result<PathBuf, GuardError> {
        let decoded = percent_decode_str(raw_path)
            .decode_utf8()
            .map_err(|_| GuardError::Forbidden)?;
        // The file service treats `\` as a filename character, so a path
        // containing one cannot be checked the way it will be served.
        if decoded.contains(|c: char| c == '\0' || c == '\\') {
            return Err(GuardError::Forbidden);
        }

        let normalized = normalize_request_path(&decoded);
        if !is_allowed(&normalized) {
            return Err(GuardError::Forbidden);
        }

        let candidate = self.root.join(normalized.trim_start_matches('/'));
        if !tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return Err(GuardError::NotFound);
        }

        if !self.strict_containment {
            return Ok(candidate);
        }

        let resolved = tokio::fs::canonicalize(&candidate)
            .await
            .map_err(|_| GuardError::NotFound)?;
        if !resolved.starts_with(&self.root) {
            tracing::warn!(
                requested = %normalized,
                resolved = %resolved.display(),
                "Resolved path escapes upload root"
            );
            return Err(GuardError::Forbidden);
        }

        Ok(resolved)
    }
}
