//! Upload filename validation and output-name derivation.
//!
//! Two names are derived for every conversion: a human-facing display name
//! (original base name plus a descriptive suffix) used in the
//! `Content-Disposition` header, and a filesystem-safe name used for the
//! actual file inside the request's working directory. Client filenames are
//! never used on disk unsanitized.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// The single upload extension this service accepts.
pub const ALLOWED_EXTENSION: &str = "xlsm";

/// Extension of the macro-free output container.
pub const OUTPUT_EXTENSION: &str = "xlsx";

/// Suffix appended to the display name so users can tell the converted copy
/// from the original at a glance.
const DISPLAY_SUFFIX: &str = " (macros removed)";

/// Fallback base name when sanitization leaves nothing usable.
const FALLBACK_STEM: &str = "workbook";

/// Characters that survive RFC 5987 `value-chars` encoding unescaped
/// (attr-char: ALPHA / DIGIT / "!" / "#" / "$" / "&" / "+" / "-" / "." /
/// "^" / "_" / "`" / "|" / "~").
const RFC5987_ESCAPED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Split a filename into (stem, extension) on the last dot.
///
/// Returns `None` for the extension when there is no dot or the dot is the
/// final character.
fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}

/// Whether an uploaded filename is acceptable: a non-empty base name and the
/// `xlsm` extension, compared case-insensitively. Pure; no filesystem access.
pub fn is_allowed_upload(name: &str) -> bool {
    let (stem, ext) = split_extension(name);
    if stem.trim().is_empty() {
        return false;
    }
    ext.is_some_and(|e| e.eq_ignore_ascii_case(ALLOWED_EXTENSION))
}

/// Reduce a client-supplied filename to something safe to use on disk.
///
/// Keeps ASCII alphanumerics, `.`, `-` and `_`; everything else (including
/// path separators and non-ASCII) becomes `_`, so a hostile filename cannot
/// escape the working directory. Leading dots are stripped to avoid hidden
/// files and `..` components. An empty result falls back to a fixed stem
/// with the original extension preserved.
pub fn sanitize(name: &str) -> String {
    let (stem, ext) = split_extension(name);

    let mut safe_stem: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    while safe_stem.starts_with('.') {
        safe_stem.remove(0);
    }
    if safe_stem.chars().all(|c| c == '_' || c == '.') {
        safe_stem = FALLBACK_STEM.to_string();
    }

    match ext {
        Some(ext) => {
            let safe_ext: String = ext
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            format!("{safe_stem}.{safe_ext}")
        }
        None => safe_stem,
    }
}

/// Human-facing name for the converted workbook, kept close to what the user
/// uploaded: original base name + suffix + `.xlsx`. May contain non-ASCII;
/// it only ever travels inside an RFC 5987 encoded header.
pub fn display_output_name(original: &str) -> String {
    let (stem, _) = split_extension(original);
    format!("{stem}{DISPLAY_SUFFIX}.{OUTPUT_EXTENSION}")
}

/// Filesystem name for the converted workbook inside the working directory.
pub fn safe_output_name(original: &str) -> String {
    let sanitized = sanitize(original);
    let (stem, _) = split_extension(&sanitized);
    format!("{stem}.{OUTPUT_EXTENSION}")
}

/// Build an RFC 5987 `Content-Disposition` value for an attachment download.
///
/// The `filename*=UTF-8''` form is the one non-ASCII-safe spelling browsers
/// agree on; anything outside attr-char is percent-encoded.
pub fn attachment_content_disposition(display_name: &str) -> String {
    format!(
        "attachment; filename*=UTF-8''{}",
        utf8_percent_encode(display_name, RFC5987_ESCAPED)
    )
}
