//! Slash-delimited path helpers.
//!
//! Object names are flat strings; these derive the "file name", extension,
//! parent prefix and MIME type purely from the text, without touching the
//! store.

/// Last path segment, ignoring trailing slashes.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

/// Extension of the last segment including the leading dot, or `""`.
///
/// A leading dot marks a hidden file, not an extension: `.env` has none.
pub fn extname(path: &str) -> &str {
    let name = basename(path);
    if name.bytes().all(|b| b == b'.') {
        return "";
    }
    match name.rfind('.') {
        Some(0) | None => "",
        Some(pos) => &name[pos..],
    }
}

/// Parent prefix of `path`; `"."` for top-level names.
pub fn dirname(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.starts_with('/') { "/" } else { "." };
    }
    match trimmed.rfind('/') {
        None => ".",
        Some(0) => "/",
        Some(pos) => {
            let parent = trimmed[..pos].trim_end_matches('/');
            if parent.is_empty() { "/" } else { parent }
        }
    }
}

/// MIME type guessed from the extension, `application/octet-stream` when
/// unknown.
pub fn mimetype(path: &str) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
