//! Input validation for every driver-facing operation.
//!
//! All failures are `QS001` validation errors; the query audit records them
//! with `status = error` before they reach the caller.

use crate::error::{Error, Result};

/// Maximum domain length in characters
pub const MAX_DOMAIN_LENGTH: usize = 100;
/// Maximum free-text query length
pub const MAX_QUERY_LENGTH: usize = 10_000;
/// Maximum number of tags per call
pub const MAX_TAG_COUNT: usize = 50;
/// Maximum tag length
pub const MAX_TAG_LENGTH: usize = 50;
/// Smallest accepted result limit
pub const MIN_LIMIT: i64 = 1;
/// Largest accepted result limit
pub const MAX_LIMIT: i64 = 1000;
/// Token ceiling for context building
pub const MAX_TOKENS: i64 = 50_000;
/// Maximum rule length for a heuristic
pub const MAX_RULE_LENGTH: usize = 500;
/// Maximum explanation length for a heuristic
pub const MAX_EXPLANATION_LENGTH: usize = 5_000;

fn is_slug_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Validate a domain slug: non-empty, bounded, `[A-Za-z0-9._-]+`, trimmed.
pub fn validate_domain(domain: &str) -> Result<String> {
    let domain = domain.trim();
    if domain.is_empty() {
        return Err(Error::Validation(
            "Domain cannot be empty. Provide a valid domain name.".into(),
        ));
    }
    if domain.len() > MAX_DOMAIN_LENGTH {
        return Err(Error::Validation(format!(
            "Domain exceeds maximum length of {MAX_DOMAIN_LENGTH} characters. Use a shorter domain name."
        )));
    }
    if !domain.chars().all(is_slug_char) {
        return Err(Error::Validation(format!(
            "Domain '{domain}' contains invalid characters. Use only alphanumeric, hyphen, underscore, and dot."
        )));
    }
    Ok(domain.to_string())
}

/// Validate a tag list: each tag bounded and slug-charset, at most
/// [`MAX_TAG_COUNT`] tags, empty entries dropped.
pub fn validate_tags(tags: &[String]) -> Result<Vec<String>> {
    if tags.len() > MAX_TAG_COUNT {
        return Err(Error::Validation(format!(
            "Too many tags (max {MAX_TAG_COUNT}). Reduce number of tags or query in batches."
        )));
    }

    let mut validated = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        if tag.len() > MAX_TAG_LENGTH {
            let preview: String = tag.chars().take(20).collect();
            return Err(Error::Validation(format!(
                "Tag '{preview}...' exceeds maximum length of {MAX_TAG_LENGTH}."
            )));
        }
        if !tag.chars().all(is_slug_char) {
            return Err(Error::Validation(format!(
                "Tag '{tag}' contains invalid characters. Use only alphanumeric, hyphen, underscore, and dot."
            )));
        }
        validated.push(tag.to_string());
    }

    if validated.is_empty() {
        return Err(Error::Validation("No valid tags provided after filtering.".into()));
    }
    Ok(validated)
}

/// Validate a free-text task description.
pub fn validate_query(query: &str) -> Result<String> {
    let query = query.trim();
    if query.is_empty() {
        return Err(Error::Validation("Query string cannot be empty.".into()));
    }
    if query.len() > MAX_QUERY_LENGTH {
        return Err(Error::Validation(format!(
            "Query exceeds maximum length of {MAX_QUERY_LENGTH} characters. Reduce query size."
        )));
    }
    Ok(query.to_string())
}

/// Validate a result limit against `[MIN_LIMIT, MAX_LIMIT]`.
pub fn validate_limit(limit: i64) -> Result<i64> {
    if limit < MIN_LIMIT {
        return Err(Error::Validation(format!("Limit must be at least {MIN_LIMIT}. Got: {limit}.")));
    }
    if limit > MAX_LIMIT {
        return Err(Error::Validation(format!(
            "Limit exceeds maximum of {MAX_LIMIT}. Use a smaller limit or process results in batches."
        )));
    }
    Ok(limit)
}

/// Validate a context token budget; values above the ceiling are rejected.
pub fn validate_max_tokens(max_tokens: i64) -> Result<i64> {
    if max_tokens < 1 {
        return Err(Error::Validation(format!("max_tokens must be positive. Got: {max_tokens}.")));
    }
    if max_tokens > MAX_TOKENS {
        return Err(Error::Validation(format!("max_tokens exceeds maximum of {MAX_TOKENS}.")));
    }
    Ok(max_tokens)
}

/// Strip control characters and collapse runs of spaces.
pub fn sanitize_text(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut last_was_space = false;
    for c in text.chars() {
        if c == '\n' || c == '\t' {
            cleaned.push(c);
            last_was_space = false;
        } else if c.is_control() {
            continue;
        } else if c == ' ' {
            if !last_was_space {
                cleaned.push(c);
            }
            last_was_space = true;
        } else {
            cleaned.push(c);
            last_was_space = false;
        }
    }
    cleaned.trim().to_string()
}

/// Sanitize a domain for use as both DB value and filename: lowercase,
/// spaces to hyphens, slug charset only.
pub fn sanitize_domain(domain: &str) -> String {
    let mut out: String = domain
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    while out.starts_with('-') {
        out.remove(0);
    }
    while out.ends_with('-') {
        out.pop();
    }
    out.truncate(MAX_DOMAIN_LENGTH);
    out
}

/// Validate a heuristic rule after sanitization.
pub fn validate_rule(rule: &str) -> Result<String> {
    let rule = sanitize_text(rule);
    if rule.is_empty() {
        return Err(Error::Validation("Rule cannot be empty.".into()));
    }
    if rule.len() > MAX_RULE_LENGTH {
        return Err(Error::Validation(format!(
            "Rule exceeds maximum length of {MAX_RULE_LENGTH} characters."
        )));
    }
    Ok(rule)
}

/// Validate a heuristic explanation after sanitization.
pub fn validate_explanation(explanation: &str) -> Result<String> {
    let explanation = sanitize_text(explanation);
    if explanation.len() > MAX_EXPLANATION_LENGTH {
        return Err(Error::Validation(format!(
            "Explanation exceeds maximum length of {MAX_EXPLANATION_LENGTH} characters."
        )));
    }
    Ok(explanation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_charset_is_enforced() {
        assert_eq!(validate_domain("  error-handling ").unwrap(), "error-handling");
        assert_eq!(validate_domain("v2.api_core").unwrap(), "v2.api_core");
        assert!(validate_domain("").is_err());
        assert!(validate_domain("has spaces").is_err());
        assert!(validate_domain("semi;colon").is_err());
        assert!(validate_domain(&"x".repeat(101)).is_err());
    }

    #[test]
    fn tags_drop_empties_and_reject_junk() {
        let tags = vec!["auth".to_string(), "  ".to_string(), "race-condition".to_string()];
        assert_eq!(validate_tags(&tags).unwrap(), vec!["auth", "race-condition"]);

        assert!(validate_tags(&["bad tag".to_string()]).is_err());
        assert!(validate_tags(&["".to_string()]).is_err());
        let too_many: Vec<String> = (0..51).map(|i| format!("t{i}")).collect();
        assert!(validate_tags(&too_many).is_err());
    }

    #[test]
    fn limit_bounds() {
        assert_eq!(validate_limit(1).unwrap(), 1);
        assert_eq!(validate_limit(1000).unwrap(), 1000);
        assert!(validate_limit(0).is_err());
        assert!(validate_limit(1001).is_err());
    }

    #[test]
    fn query_length_bound() {
        assert!(validate_query("fix the auth flow").is_ok());
        assert!(validate_query("   ").is_err());
        assert!(validate_query(&"q".repeat(10_001)).is_err());
    }

    #[test]
    fn sanitize_text_strips_controls_and_collapses_spaces() {
        assert_eq!(sanitize_text("a\u{0007}b   c  "), "ab c");
        assert_eq!(sanitize_text("line1\nline2"), "line1\nline2");
    }

    #[test]
    fn sanitize_domain_produces_slug() {
        assert_eq!(sanitize_domain("Error Handling!"), "error-handling");
        assert_eq!(sanitize_domain("--api--"), "api");
        assert_eq!(sanitize_domain("!!!"), "");
    }
}
