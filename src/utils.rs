//! Utility functions for artifact naming and path handling

use crate::config::FileCollisionAction;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Extract the suggested filename from a `Content-Disposition` header value
///
/// Understands both `filename="report.xlsx"` and the RFC 5987 form
/// `filename*=UTF-8''report%20enero.xlsx`; the extended form wins when both
/// are present. Returns `None` when no usable name is found.
///
/// # Examples
///
/// ```
/// use report_dl::utils::filename_from_content_disposition;
///
/// assert_eq!(
///     filename_from_content_disposition("attachment; filename=\"ventas.xlsx\""),
///     Some("ventas.xlsx".to_string())
/// );
/// assert_eq!(filename_from_content_disposition("inline"), None);
/// ```
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;

    for part in value.split(';') {
        let part = part.trim();
        if let Some(encoded) = strip_prefix_ignore_case(part, "filename*=") {
            // Format is: charset'lang'encoded-filename
            let encoded = encoded.trim_matches('"');
            let encoded = match encoded.rfind('\'') {
                Some(idx) => &encoded[idx + 1..],
                None => encoded,
            };
            if let Ok(decoded) = urlencoding::decode(encoded)
                && let Some(name) = sanitize_filename(&decoded)
            {
                return Some(name);
            }
        } else if let Some(raw) = strip_prefix_ignore_case(part, "filename=") {
            plain = sanitize_filename(raw.trim_matches(|c| c == '"' || c == '\''));
        }
    }

    plain
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Reduce a server-suggested name to a safe single path component
///
/// Directory parts (either separator) are dropped and control characters
/// removed. Returns `None` if nothing usable is left.
///
/// # Examples
///
/// ```
/// use report_dl::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("../../etc/passwd"), Some("passwd".to_string()));
/// assert_eq!(sanitize_filename(".."), None);
/// ```
pub fn sanitize_filename(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return None;
    }
    Some(cleaned.to_string())
}

/// Get a unique path for a file, handling collisions according to the specified action
///
/// For Rename, `report.xlsx` becomes `report (1).xlsx`, then `report (2).xlsx`, etc.
/// For Skip, an existing file is an error. For Overwrite, the path is returned unchanged.
pub fn get_unique_path(path: &Path, action: FileCollisionAction) -> Result<PathBuf> {
    match action {
        FileCollisionAction::Overwrite => Ok(path.to_path_buf()),
        FileCollisionAction::Skip => {
            if path.exists() {
                return Err(Error::Delivery {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "file already exists and collision action is Skip",
                    ),
                });
            }
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let invalid = |reason: &str| Error::Delivery {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, reason.to_string()),
            };

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| invalid("cannot extract file stem"))?;
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path
                .parent()
                .ok_or_else(|| invalid("cannot extract parent directory"))?;

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{} ({}).{}", stem, i, ext),
                    None => format!("{} ({})", stem, i),
                };
                let new_path = parent.join(new_name);
                if !new_path.exists() {
                    return Ok(new_path);
                }
            }

            Err(Error::Delivery {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!(
                        "could not find unique filename after {} attempts",
                        MAX_RENAME_ATTEMPTS
                    ),
                ),
            })
        }
    }
}
