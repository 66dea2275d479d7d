//! Video identifier extraction

use regex::Regex;
use std::sync::LazyLock;

/// `watch?v=` and `youtu.be/` links, with optional scheme, `www.` and
/// trailing query parameters.
static VIDEO_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.)?(youtube\.com/watch\?v=|youtu\.be/)([a-zA-Z0-9_-]{11})(?:[?&].+)?$")
        .expect("video URL pattern compiles")
});

/// The 11-character identifier in `url`, or `None` if the URL is not a
/// recognised video link.
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_URL_REGEX
        .captures(url.trim())
        .and_then(|c| c.get(4))
        .map(|m| m.as_str().to_string())
}

pub fn is_valid_url(url: &str) -> bool {
    VIDEO_URL_REGEX.is_match(url.trim())
}

/// Canonical watch URL for an identifier
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}
