//! Classification of yt-dlp failures
//!
//! Turns the stderr of a failed run into a coarse category so the logs say
//! what to do about it (refresh cookies, update yt-dlp, nothing at all).

/// Known failure families of yt-dlp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YtDlpErrorType {
    /// Cookies are invalid or expired
    InvalidCookies,
    /// YouTube flagged the request as automated
    BotDetection,
    /// Video is private, removed or region-locked
    VideoUnavailable,
    /// Timeouts, DNS, refused connections
    NetworkError,
    Unknown,
}

impl YtDlpErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            YtDlpErrorType::InvalidCookies => "invalid_cookies",
            YtDlpErrorType::BotDetection => "bot_detection",
            YtDlpErrorType::VideoUnavailable => "video_unavailable",
            YtDlpErrorType::NetworkError => "network",
            YtDlpErrorType::Unknown => "unknown",
        }
    }
}

/// Inspects yt-dlp stderr and picks the matching failure family
pub fn analyze_ytdlp_error(stderr: &str) -> YtDlpErrorType {
    let stderr_lower = stderr.to_lowercase();

    if stderr_lower.contains("cookies are no longer valid")
        || stderr_lower.contains("cookies have likely been rotated")
        || stderr_lower.contains("sign in to confirm you're not a bot")
        || stderr_lower.contains("please sign in")
        || stderr_lower.contains("use --cookies-from-browser")
        || stderr_lower.contains("use --cookies for the authentication")
    {
        return YtDlpErrorType::InvalidCookies;
    }

    if stderr_lower.contains("bot detection")
        || stderr_lower.contains("http error 403")
        || stderr_lower.contains("unable to extract")
        || stderr_lower.contains("signature extraction failed")
    {
        return YtDlpErrorType::BotDetection;
    }

    if stderr_lower.contains("private video")
        || stderr_lower.contains("video unavailable")
        || stderr_lower.contains("video is private")
        || stderr_lower.contains("video has been removed")
        || stderr_lower.contains("this video does not exist")
        || stderr_lower.contains("video is not available")
    {
        return YtDlpErrorType::VideoUnavailable;
    }

    if stderr_lower.contains("timed out")
        || stderr_lower.contains("timeout")
        || stderr_lower.contains("connection")
        || stderr_lower.contains("network")
        || stderr_lower.contains("name resolution")
        || stderr_lower.contains("failed to connect")
    {
        return YtDlpErrorType::NetworkError;
    }

    YtDlpErrorType::Unknown
}

/// Whether the failure points at the deployment rather than at the video
pub fn needs_operator_attention(error_type: YtDlpErrorType) -> bool {
    matches!(
        error_type,
        YtDlpErrorType::InvalidCookies | YtDlpErrorType::BotDetection | YtDlpErrorType::Unknown
    )
}

/// Operator hint logged next to a failure
pub fn get_fix_recommendations(error_type: YtDlpErrorType) -> &'static str {
    match error_type {
        YtDlpErrorType::InvalidCookies => {
            "Cookies are stale or were rotated by the browser. Export a fresh Netscape cookies file \
             and upload it with PUT /api/cookies."
        }
        YtDlpErrorType::BotDetection => {
            "YouTube rejected the request as automated. Refresh cookies and make sure yt-dlp is up to date."
        }
        YtDlpErrorType::VideoUnavailable => "Video is unavailable; no action needed.",
        YtDlpErrorType::NetworkError => "Check connectivity to youtube.com and retry.",
        YtDlpErrorType::Unknown => "Inspect the yt-dlp output above and check that yt-dlp is up to date.",
    }
}
