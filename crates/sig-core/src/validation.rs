//! Filename, size, MIME type, and identifier validation.
//!
//! Every check here is defensive, not semantic: the core never inspects
//! payload bytes, but it still has to reject malformed input before it
//! reaches the repository or the state machine.

/// Filenames are truncated to this many bytes after sanitization.
pub const MAX_FILENAME_BYTES: usize = 255;
/// MIME type strings are truncated to this many bytes.
pub const MAX_MIME_BYTES: usize = 100;
/// Upper bound on accepted file size: 100 GiB.
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024 * 1024;

/// Extensions considered dangerous: executables, scripts, installers,
/// shortcuts.
pub const BLOCKED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "bat", "cmd", "com", "scr", "pif", "vbs", "js", "jse", "wsf", "wsh", "msi",
    "msp", "hta", "cpl", "jar", "ps1", "psm1", "reg", "vb", "vbe", "ws", "application", "gadget",
    "msc", "lnk",
];

/// MIME substrings considered suspicious (flag, never reject).
pub const SUSPICIOUS_MIME_SUBSTRINGS: &[&str] = &[
    "application/x-msdownload",
    "application/x-msdos-program",
    "application/x-executable",
    "application/x-bat",
    "application/x-sh",
    "text/x-script.python",
];

/// Result of validating the three upload-init fields together.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    /// Sanitized filename.
    pub file_name: String,
    /// Lowercased, truncated MIME type.
    pub file_type: String,
    /// Original (validated) size.
    pub file_size: u64,
    /// Set if the filename extension or MIME type looked dangerous.
    pub dangerous: bool,
    /// Human-readable warnings to surface to the sender and joiner.
    pub warnings: Vec<String>,
}

/// A single-field validation error, convertible into the client-facing
/// `invalid-input` kind by the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Filename is empty, or empty after sanitization.
    #[error("invalid filename")]
    InvalidFileName,
    /// Size is zero, negative, or exceeds the maximum.
    #[error("invalid file size")]
    InvalidFileSize,
    /// MIME type is empty.
    #[error("invalid file type")]
    InvalidFileType,
    /// Identifier does not match the canonical session id shape.
    #[error("invalid identifier")]
    InvalidIdentifier,
    /// Endpoint identifier is empty.
    #[error("invalid endpoint identifier")]
    InvalidEndpointId,
}

/// Validate and sanitize a filename. Removes `..` substrings, replaces path
/// separators and `<>:"|?*` and control bytes with `_`, then truncates to
/// [`MAX_FILENAME_BYTES`]. Rejects if empty before or after sanitization.
pub fn sanitize_filename(name: &str) -> Result<String, ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::InvalidFileName);
    }

    let without_traversal = name.replace("..", "");

    let mut sanitized: String = without_traversal
        .chars()
        .map(|c| match c {
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if (c as u32) <= 0x1F => '_',
            c => c,
        })
        .collect();

    if sanitized.len() > MAX_FILENAME_BYTES {
        let mut truncated = String::with_capacity(MAX_FILENAME_BYTES);
        for c in sanitized.chars() {
            if truncated.len() + c.len_utf8() > MAX_FILENAME_BYTES {
                break;
            }
            truncated.push(c);
        }
        sanitized = truncated;
    }

    if sanitized.is_empty() {
        return Err(ValidationError::InvalidFileName);
    }

    Ok(sanitized)
}

/// Validate a file size: non-negative (enforced by the `u64` type itself)
/// and non-zero, no greater than [`MAX_FILE_SIZE`].
pub fn validate_size(size: u64) -> Result<u64, ValidationError> {
    if size == 0 || size > MAX_FILE_SIZE {
        return Err(ValidationError::InvalidFileSize);
    }
    Ok(size)
}

/// Normalize a MIME type: non-empty, truncated, lowercased. Does not reject
/// on the suspicious list — see [`is_suspicious_mime`] for that flag.
pub fn normalize_mime_type(mime: &str) -> Result<String, ValidationError> {
    if mime.is_empty() {
        return Err(ValidationError::InvalidFileType);
    }

    let lowered = mime.to_lowercase();
    let truncated: String = lowered.chars().take(MAX_MIME_BYTES).collect();
    Ok(truncated)
}

/// True if `mime` matches any entry in [`SUSPICIOUS_MIME_SUBSTRINGS`].
#[must_use]
pub fn is_suspicious_mime(mime: &str) -> bool {
    SUSPICIOUS_MIME_SUBSTRINGS
        .iter()
        .any(|suspicious| mime.contains(suspicious))
}

/// True if the filename's extension is dangerous: the last dot-segment
/// matches the blocked set, or (double-extension attack) the last segment
/// is benign but the second-to-last is blocked and there are at least three
/// segments.
#[must_use]
pub fn is_dangerous_extension(file_name: &str) -> bool {
    let segments: Vec<&str> = file_name.split('.').collect();
    if segments.len() < 2 {
        return false;
    }

    let last = segments[segments.len() - 1].to_lowercase();
    if BLOCKED_EXTENSIONS.contains(&last.as_str()) {
        return true;
    }

    if segments.len() >= 3 {
        let second_to_last = segments[segments.len() - 2].to_lowercase();
        if BLOCKED_EXTENSIONS.contains(&second_to_last.as_str()) {
            return true;
        }
    }

    false
}

/// Validate the full upload-init triple, combining filename sanitization,
/// size bounds, MIME normalization, and danger flagging into one result.
pub fn validate_upload(
    file_name: &str,
    file_size: u64,
    file_type: &str,
) -> Result<ValidatedUpload, ValidationError> {
    let sanitized_name = sanitize_filename(file_name)?;
    let size = validate_size(file_size)?;
    let mime = normalize_mime_type(file_type)?;

    let mut warnings = Vec::new();
    let extension_dangerous = is_dangerous_extension(&sanitized_name);
    let mime_dangerous = is_suspicious_mime(&mime);
    let dangerous = extension_dangerous || mime_dangerous;

    if extension_dangerous {
        if let Some(ext) = sanitized_name.rsplit('.').next() {
            warnings.push(format!("file extension '.{ext}' may be unsafe to open"));
        }
    }
    if mime_dangerous {
        warnings.push(format!("file type '{mime}' may be unsafe to open"));
    }

    Ok(ValidatedUpload {
        file_name: sanitized_name,
        file_type: mime,
        file_size: size,
        dangerous,
        warnings,
    })
}

/// Validate a session identifier against the canonical
/// `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` hex-with-hyphens shape
/// (case-insensitive).
#[must_use]
pub fn validate_session_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    if bytes.len() != 36 {
        return false;
    }

    const HYPHEN_POSITIONS: [usize; 4] = [8, 13, 18, 23];
    for (i, &b) in bytes.iter().enumerate() {
        if HYPHEN_POSITIONS.contains(&i) {
            if b != b'-' {
                return false;
            }
        } else if !b.is_ascii_hexdigit() {
            return false;
        }
    }
    true
}

/// Validate an endpoint identifier: simply non-empty.
#[must_use]
pub fn validate_endpoint_id(id: &str) -> bool {
    !id.is_empty()
}
