use chrono::{DateTime, Datelike, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

pub const MAX_SLUG_LEN: usize = 50;
pub const MAX_LINK_SLUG_LEN: usize = 100;
pub const DOWNLOAD_SLUG_LEN: usize = 10;
pub const ACCESS_KEY_LEN: usize = 16;
pub const MIN_ACCESS_KEY_LEN: usize = 8;

fn non_slug_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9\s-]").expect("valid regex"))
}

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"))
}

fn hyphen_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-+").expect("valid regex"))
}

fn link_slug_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"))
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// Lowercases, folds accents, keeps `[a-z0-9-]`, collapses hyphens and
/// truncates to [`MAX_SLUG_LEN`]. Leading/trailing hyphens are dropped.
pub fn slugify(text: &str) -> String {
    let folded: String = text.to_lowercase().chars().map(fold_accent).collect();
    let cleaned = non_slug_chars().replace_all(&folded, "");
    let hyphenated = whitespace_runs().replace_all(cleaned.trim(), "-");
    let collapsed = hyphen_runs().replace_all(&hyphenated, "-");
    let truncated: String = collapsed.chars().take(MAX_SLUG_LEN).collect();
    truncated.trim_matches('-').to_string()
}

/// True for slugs produced by [`slugify`].
pub fn is_slug_safe(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_SLUG_LEN
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Validation for user-chosen link slugs, which may keep case and `_`.
pub fn validate_link_slug(slug: &str) -> Result<(), String> {
    if slug.is_empty() {
        return Err("Slug is required".to_string());
    }
    if slug.len() > MAX_LINK_SLUG_LEN {
        return Err(format!("Slug must be at most {MAX_LINK_SLUG_LEN} characters"));
    }
    if !link_slug_pattern().is_match(slug) {
        return Err("Slug may only contain letters, digits, '-' and '_'".to_string());
    }
    Ok(())
}

/// Accepts absolute http(s) URLs with a host.
pub fn valid_target(u: &str) -> bool {
    match Url::parse(u) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some(),
        Err(_) => false,
    }
}

pub fn random_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn generate_download_slug() -> String {
    random_alphanumeric(DOWNLOAD_SLUG_LEN)
}

pub fn generate_access_key() -> String {
    random_alphanumeric(ACCESS_KEY_LEN)
}

pub fn validate_access_key(access_key: &str) -> Result<&str, String> {
    let trimmed = access_key.trim();
    if trimmed.is_empty() {
        return Err("Access key is required".to_string());
    }
    if trimmed.len() < MIN_ACCESS_KEY_LEN {
        return Err("Access key is too short".to_string());
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("Access key contains invalid characters".to_string());
    }
    Ok(trimmed)
}

/// Host without a leading `www.`, or `None` when the URL does not parse.
pub fn extract_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// `DDMMYYYY`
pub fn date_slug(now: DateTime<Utc>) -> String {
    format!("{:02}{:02}{}", now.day(), now.month(), now.year())
}

/// Last six digits of the epoch milliseconds.
pub fn timestamp_suffix(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().to_string();
    millis[millis.len().saturating_sub(6)..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn slugify_normalizes_text() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  Ação   Rápida!! "), "acao-rapida");
        assert_eq!(slugify("a -- b"), "a-b");
        assert_eq!(slugify("example.com"), "examplecom");
    }

    #[test]
    fn slugify_truncates_to_fifty() {
        let long = "word ".repeat(30);
        let slug = slugify(&long);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(is_slug_safe(&slug));
    }

    #[test]
    fn slugify_can_yield_empty() {
        assert_eq!(slugify("!!!"), "");
        assert!(!is_slug_safe(""));
    }

    #[test]
    fn link_slug_validation() {
        assert!(validate_link_slug("My_Docs-2").is_ok());
        assert!(validate_link_slug("").is_err());
        assert!(validate_link_slug("with space").is_err());
        assert!(validate_link_slug(&"a".repeat(MAX_LINK_SLUG_LEN + 1)).is_err());
    }

    #[test]
    fn accepts_https() {
        assert!(valid_target("https://example.com"));
    }

    #[test]
    fn rejects_javascript_urls() {
        assert!(!valid_target("javascript:alert(1)"));
    }

    #[test]
    fn rejects_empty() {
        assert!(!valid_target(""));
    }

    #[test]
    fn generated_tokens_are_alphanumeric() {
        let slug = generate_download_slug();
        assert_eq!(slug.len(), DOWNLOAD_SLUG_LEN);
        assert!(slug.chars().all(|c| c.is_ascii_alphanumeric()));
        let key = generate_access_key();
        assert_eq!(key.len(), ACCESS_KEY_LEN);
        assert!(validate_access_key(&key).is_ok());
    }

    #[test]
    fn access_key_rules() {
        assert_eq!(validate_access_key("  abcdEFGH12 "), Ok("abcdEFGH12"));
        assert!(validate_access_key("   ").is_err());
        assert!(validate_access_key("short").is_err());
        assert!(validate_access_key("abcd-efgh-ijkl").is_err());
    }

    #[test]
    fn domain_strips_www() {
        assert_eq!(extract_domain("https://www.github.com/x").as_deref(), Some("github.com"));
        assert_eq!(extract_domain("not a url"), None);
    }

    #[test]
    fn date_and_timestamp_formats() {
        let t = Utc.with_ymd_and_hms(2024, 3, 7, 10, 0, 0).unwrap();
        assert_eq!(date_slug(t), "07032024");
        let suffix = timestamp_suffix(t);
        assert_eq!(suffix.len(), 6);
        assert!(t.timestamp_millis().to_string().ends_with(&suffix));
    }
}
