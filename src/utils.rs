//! Wire-format parsing helpers shared by the transfer executor: `Content-Type`
//! splitting, `Content-Disposition` filename extraction, and collision-safe
//! destination paths.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::types::{BaseDirectory, TaskMeta};

/// Maximum number of `(n)` suffixes tried before giving up on a unique name.
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Resolve a task's destination directory from its `baseDirectory`/
/// `directory` pair (§3), without the filename. `ApplicationSupport`/
/// `ApplicationLibrary` are not independently configurable and resolve
/// under the same root as `ApplicationDocuments`, distinguished only by a
/// fixed subdirectory.
pub fn resolve_destination_dir(config: &Config, meta: &TaskMeta) -> PathBuf {
    let root = match meta.base_directory {
        BaseDirectory::ApplicationDocuments => PathBuf::from(config.base_directory()),
        BaseDirectory::ApplicationSupport => PathBuf::from(config.base_directory()).join(".support"),
        BaseDirectory::ApplicationLibrary => PathBuf::from(config.base_directory()).join(".library"),
        BaseDirectory::Temporary => PathBuf::from(config.temp_dir()),
        BaseDirectory::Root => PathBuf::from("/"),
    };

    if meta.base_directory == BaseDirectory::Root {
        if !meta.directory.is_empty() {
            Path::new("/").join(meta.directory.trim_start_matches(['/', '\\']))
        } else {
            PathBuf::from("/")
        }
    } else if !meta.directory.is_empty() {
        root.join(&meta.directory)
    } else {
        root
    }
}

/// Resolve a task's full destination path from its `baseDirectory`/
/// `directory`/`filename` triple (§3). Uses `meta.filename` verbatim,
/// including the `"?"` suggested-filename sentinel if still unresolved;
/// callers downloading from the network should resolve the sentinel via
/// [`crate::engine::executor::resolve_filename`] against the server's
/// response before calling this.
pub fn resolve_destination(config: &Config, meta: &TaskMeta) -> PathBuf {
    resolve_destination_dir(config, meta).join(&meta.filename)
}

/// Parse a `Content-Type` header value into `(mime_type, charset)` against
/// the wire contract's own regex in §6: `"(.*);\s*charset\s*=(.*)"`.
pub fn parse_content_type(value: &str) -> (Option<String>, Option<String>) {
    static CHARSET_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = CHARSET_RE.get_or_init(|| {
        regex::Regex::new(r#"(?i)^(.*);\s*charset\s*=\s*"?([^";]*)"?\s*$"#)
            .expect("static charset regex is valid")
    });

    match re.captures(value) {
        Some(caps) => {
            let mime = caps.get(1).map(|m| m.as_str().trim().to_string());
            let charset = caps.get(2).map(|m| m.as_str().trim().to_string());
            (mime, charset)
        }
        None => (Some(value.trim().to_string()), None),
    }
}

/// Extract a filename from a `Content-Disposition` header value, supporting
/// the three forms named in §6: unquoted `filename=x`, quoted
/// `filename="x"`, and RFC 5987 `filename*=charset''%encoded`. The RFC 5987
/// form wins when both are present.
pub fn parse_content_disposition_filename(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for part in value.split(';') {
        let part = part.trim();
        if let Some(raw) = part.strip_prefix("filename*=") {
            // charset'lang'percent-encoded-value
            if let Some(idx) = raw.rfind('\'') {
                let encoded = &raw[idx + 1..];
                if let Ok(decoded) = urlencoding::decode(encoded) {
                    extended = Some(decoded.into_owned());
                }
            }
        } else if let Some(raw) = part.strip_prefix("filename=") {
            plain = Some(raw.trim_matches('"').to_string());
        }
    }

    extended.or(plain)
}

/// Resolve a collision-safe path for `path`. When `unique` is false the path
/// is returned unchanged (the transfer overwrites any existing file). When
/// `unique` is true and `path` already exists, ` (n)` is inserted before the
/// extension, incrementing `n` until a free name is found.
pub fn unique_destination_path(path: &Path, unique: bool) -> PathBuf {
    if !unique || !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file")
        .to_string();
    let extension = path.extension().and_then(|e| e.to_str());
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let candidate_name = match extension {
            Some(ext) => format!("{stem} ({i}).{ext}"),
            None => format!("{stem} ({i})"),
        };
        let candidate = parent.join(candidate_name);
        if !candidate.exists() {
            return candidate;
        }
    }

    path.to_path_buf()
}
