// src/utils.rs
use regex::Regex;
use std::sync::OnceLock;

fn candidate_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9\-.]*[a-z0-9]$").expect("candidate pattern is a valid regex")
    })
}

/// Check if a string is a valid domain
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }

    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() < 2 {
        return false;
    }

    for part in parts {
        if part.is_empty() || part.len() > 63 {
            return false;
        }

        if !part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return false;
        }

        if part.starts_with('-') || part.ends_with('-') {
            return false;
        }
    }

    true
}

/// Normalize a raw provider entry into a candidate subdomain of `domain`.
///
/// Whitespace, trailing dots and every `*.` wildcard marker are removed and
/// the result is lower-cased. Returns `None` for the base domain itself, for
/// names outside `domain`, and for names with characters outside
/// `[a-z0-9.-]`.
pub fn normalize_candidate(raw: &str, domain: &str) -> Option<String> {
    let domain = domain.trim().trim_end_matches('.').to_lowercase();
    let name = raw.trim().trim_end_matches('.').to_lowercase().replace("*.", "");

    if name == domain || !name.ends_with(&format!(".{}", domain)) {
        return None;
    }

    if !candidate_pattern().is_match(&name) || name.contains("..") {
        return None;
    }

    Some(name)
}

/// Get terminal width
pub fn terminal_width() -> usize {
    term_size::dimensions().map(|(w, _)| w).unwrap_or(80)
}

/// Cut a string to at most `max` characters, marking the cut with `~`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('~');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_domain() {
        assert!(is_valid_domain("example.com"));
        assert!(is_valid_domain("sub.example.com"));
        assert!(!is_valid_domain("example"));
        assert!(!is_valid_domain(""));
        assert!(!is_valid_domain("-example.com"));
        assert!(!is_valid_domain("example-.com"));
    }

    #[test]
    fn test_normalize_candidate() {
        assert_eq!(
            normalize_candidate("WWW.Example.com", "example.com").as_deref(),
            Some("www.example.com")
        );
        assert_eq!(
            normalize_candidate("  api.example.com.\n", "example.com").as_deref(),
            Some("api.example.com")
        );
        assert_eq!(
            normalize_candidate("*.dev.example.com", "example.com").as_deref(),
            Some("dev.example.com")
        );
        assert_eq!(
            normalize_candidate("foo.*.example.com", "example.com").as_deref(),
            Some("foo.example.com")
        );
        assert_eq!(
            normalize_candidate("*.*.mail.example.com", "example.com").as_deref(),
            Some("mail.example.com")
        );
    }

    #[test]
    fn test_normalize_rejects() {
        // wildcard collapses to the base domain
        assert!(normalize_candidate("*.example.com", "example.com").is_none());
        assert!(normalize_candidate("example.com", "example.com").is_none());
        assert!(normalize_candidate("notexample.org", "example.com").is_none());
        assert!(normalize_candidate("notexample.com", "example.com").is_none());
        assert!(normalize_candidate("foo_bar.example.com", "example.com").is_none());
        assert!(normalize_candidate("-api.example.com", "example.com").is_none());
        assert!(normalize_candidate("a..example.com", "example.com").is_none());
        assert!(normalize_candidate("", "example.com").is_none());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Cloudflare", 20), "Cloudflare");
        assert_eq!(truncate("Amazon Web Services", 6), "Amazo~");
    }
}
