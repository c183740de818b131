//! Golden-rules file access: per-path TTL cache with mtime invalidation,
//! and category filtering over rule blocks.

use crate::error::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

/// Fallback content when no golden-rules file exists yet
pub const DEFAULT_GOLDEN_RULES: &str =
    "# Golden Rules\n\nNo golden rules have been established yet.";

#[derive(Clone)]
struct CachedFile {
    content: String,
    loaded_at: Instant,
    mtime: Option<SystemTime>,
}

/// Per-path cache for the golden-rules markdown. Entries expire after the
/// TTL and are invalidated early when the file's mtime changes.
pub struct GoldenRulesCache {
    ttl: Duration,
    entries: RwLock<HashMap<PathBuf, CachedFile>>,
}

impl GoldenRulesCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    /// Read the file through the cache.
    pub async fn get(&self, path: &Path) -> Result<String> {
        let mtime = tokio::fs::metadata(path).await.ok().and_then(|m| m.modified().ok());

        if let Some(cached) = self.entries.read().get(path) {
            if cached.loaded_at.elapsed() < self.ttl && cached.mtime == mtime {
                return Ok(cached.content.clone());
            }
        }

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DEFAULT_GOLDEN_RULES.to_string());
            }
            Err(e) => return Err(e.into()),
        };

        self.entries.write().insert(
            path.to_path_buf(),
            CachedFile { content: content.clone(), loaded_at: Instant::now(), mtime },
        );
        Ok(content)
    }

    /// Drop all cached entries.
    pub fn invalidate(&self) {
        self.entries.write().clear();
    }
}

/// Filter golden-rules markdown to rule blocks whose `**Category:**` line
/// matches one of the requested categories. The file header before the
/// first rule is always kept, and a filter note is appended.
pub fn filter_by_category(content: &str, categories: &[String]) -> String {
    let categories_lower: Vec<String> = categories.iter().map(|c| c.to_lowercase()).collect();

    let mut result_lines: Vec<&str> = Vec::new();
    let mut current_rule: Vec<&str> = Vec::new();
    let mut in_rule = false;
    let mut include_current = false;
    let mut header_ended = false;

    let is_rule_header = |line: &str| {
        line.strip_prefix("## ")
            .and_then(|rest| rest.split('.').next())
            .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
    };

    for line in content.lines() {
        if is_rule_header(line) {
            if in_rule && include_current {
                result_lines.extend(current_rule.iter());
            }
            in_rule = true;
            header_ended = true;
            current_rule = vec![line];
            include_current = false;
        } else if in_rule {
            current_rule.push(line);
            if let Some(rest) = line.strip_prefix("**Category:**") {
                let rule_category = rest.trim().to_lowercase();
                if categories_lower.contains(&rule_category) {
                    include_current = true;
                }
            }
        } else if !header_ended {
            result_lines.push(line);
        }
    }
    if in_rule && include_current {
        result_lines.extend(current_rule.iter());
    }

    format!(
        "{}\n\n*[Filtered to categories: {}]*\n",
        result_lines.join("\n"),
        categories.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Golden Rules\n\nIntro text.\n\n\
        ## 1. Commit early\n> Small diffs.\n**Category:** git\n\n\
        ## 2. Validate inputs\n> Everywhere.\n**Category:** core\n\n\
        ## 3. Rebase before push\n> Keep history linear.\n**Category:** git\n";

    #[test]
    fn filters_to_matching_categories_only() {
        let filtered = filter_by_category(SAMPLE, &["git".to_string()]);
        assert!(filtered.contains("## 1. Commit early"));
        assert!(filtered.contains("## 3. Rebase before push"));
        assert!(!filtered.contains("## 2. Validate inputs"));
        assert!(filtered.contains("*[Filtered to categories: git]*"));
        // header is preserved
        assert!(filtered.starts_with("# Golden Rules"));
    }

    #[test]
    fn category_match_is_case_insensitive() {
        let filtered = filter_by_category(SAMPLE, &["GIT".to_string()]);
        assert!(filtered.contains("## 1. Commit early"));
    }

    #[test]
    fn no_matches_keeps_header_and_note() {
        let filtered = filter_by_category(SAMPLE, &["kubernetes".to_string()]);
        assert!(!filtered.contains("## 1."));
        assert!(filtered.contains("# Golden Rules"));
        assert!(filtered.contains("*[Filtered to categories: kubernetes]*"));
    }

    #[tokio::test]
    async fn cache_serves_until_mtime_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("golden-rules.md");
        tokio::fs::write(&path, "version one").await.unwrap();

        let cache = GoldenRulesCache::new(Duration::from_secs(300));
        assert_eq!(cache.get(&path).await.unwrap(), "version one");

        // Rewrite with a distinct mtime; the cache must notice
        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::fs::write(&path, "version two").await.unwrap();
        let file = std::fs::File::options().append(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(2)).unwrap();
        drop(file);

        assert_eq!(cache.get(&path).await.unwrap(), "version two");
    }

    #[tokio::test]
    async fn missing_file_yields_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GoldenRulesCache::new(Duration::from_secs(300));
        let content = cache.get(&dir.path().join("absent.md")).await.unwrap();
        assert_eq!(content, DEFAULT_GOLDEN_RULES);
    }
}
