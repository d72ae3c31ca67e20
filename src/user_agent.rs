//! Default User-Agent string for download requests.

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/resumable-downloader";

/// Default User-Agent for download requests (identifies the tool and platform).
#[must_use]
pub fn default_download_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!(
        "rdl/{version} ({}/{}; +{PROJECT_UA_URL})",
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_ua_contains_version_and_url() {
        let ua = default_download_user_agent();
        assert!(ua.contains(PROJECT_UA_URL), "UA must contain project URL");
        assert_eq!(
            Some(env!("CARGO_PKG_VERSION")),
            ua.strip_prefix("rdl/").and_then(|s| s.split(' ').next()),
            "UA must contain crate version"
        );
    }

    #[test]
    fn test_download_ua_names_platform() {
        let ua = default_download_user_agent();
        assert!(ua.contains(std::env::consts::OS), "UA must name the OS: {ua}");
    }
}
