use std::path::{Path, PathBuf};

/// Longest title kept, in characters.
pub const MAX_TITLE_LEN: usize = 250;

/// Make a post title safe to use as a file name.
///
/// Non-ASCII and control characters are dropped along with
/// `\ / * ? : . " < > |`, and the result is capped at [`MAX_TITLE_LEN`].
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .filter(|c| !matches!(c, '\\' | '/' | '*' | '?' | ':' | '.' | '"' | '<' | '>' | '|'))
        .take(MAX_TITLE_LEN)
        .collect()
}

/// Extension-less destination for a post: `root/<sub>/<title>`.
///
/// Falls back to the id when the title is empty, so untitled posts from the
/// same community don't collide.
pub fn destination(root: &Path, subreddit: &str, title: &str, id: &str) -> PathBuf {
    let sub = sanitize_title(subreddit);
    let name = if title.is_empty() { id } else { title };
    root.join(sub).join(name)
}

/// Append `.ext` to an extension-less destination.
///
/// Titles may still contain spaces or other characters `Path::with_extension`
/// would misread, so the suffix is appended to the raw name.
pub fn with_extension(dest: &Path, ext: &str) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// File extension for a `Content-Type` header value.
///
/// Parameters after `;` are ignored. Common media types map to their usual
/// extension; anything else goes through the `mime_guess` table.
pub fn extension_for_content_type(content_type: &str) -> Option<String> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    let preferred = match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "video/mp4" => Some("mp4"),
        "video/webm" => Some("webm"),
        _ => None,
    };
    if let Some(ext) = preferred {
        return Some(ext.to_string());
    }
    mime_guess::get_mime_extensions_str(&essence)
        .and_then(|exts| exts.first())
        .map(|ext| ext.to_string())
}
