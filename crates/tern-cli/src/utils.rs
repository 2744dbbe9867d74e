//! Shared utilities

use anyhow::Context;
use base64::{Engine, engine::general_purpose::STANDARD};
use std::path::Path;
use tern_wire::ImageAttachment;

/// Truncate a string to `max` characters, appending "..." if truncated.
/// Operates on Unicode char boundaries, not bytes.
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// MIME type for an image path, by extension
pub fn image_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// Read an image file into a base64 attachment
pub fn read_image(path: &Path) -> anyhow::Result<ImageAttachment> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image {}", path.display()))?;
    Ok(ImageAttachment {
        data: STANDARD.encode(bytes),
        mime_type: image_mime_type(path).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("Lisbon", 10), "Lisbon");
        assert_eq!(truncate_chars("Lisbon", 3), "Lis...");
        assert_eq!(truncate_chars("Zürich", 2), "Zü...");
    }

    #[test]
    fn test_image_mime_type() {
        assert_eq!(image_mime_type(Path::new("map.PNG")), "image/png");
        assert_eq!(image_mime_type(Path::new("boarding.webp")), "image/webp");
        assert_eq!(image_mime_type(Path::new("photo.jpg")), "image/jpeg");
        assert_eq!(image_mime_type(Path::new("noext")), "image/jpeg");
    }

    #[test]
    fn test_read_missing_image_names_path() {
        let err = read_image(Path::new("/nonexistent/tern/map.png")).unwrap_err();
        assert!(err.to_string().contains("map.png"));
    }
}
