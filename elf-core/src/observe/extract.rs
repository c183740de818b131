//! Pattern extraction from sorted `tool_use` events.

use super::{Outcome, SessionEvent};
use crate::model::{ExtractedPattern, PatternKind};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Window within which a same-tool call counts as a retry of a failure
const RETRY_WINDOW_SECONDS: i64 = 120;
/// Minimum occurrences for an error signature to become a pattern
const MIN_ERROR_OCCURRENCES: usize = 2;
/// Minimum reads after a search for a search pattern
const MIN_SEARCH_READS: usize = 2;
/// Minimum successful predecessors for a success sequence
const MIN_SUCCESS_CHAIN: usize = 3;
/// Minimum repetitions for an adjacent tool pair
const MIN_PAIR_COUNT: usize = 5;

/// Error signature catalog: regex -> normalized label, checked in order.
static ERROR_CATALOG: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)permission denied", "permission_denied"),
        (r"(?i)module.?not.?found|cannot.?find.?module", "module_not_found"),
        (r"(?i)timeout|timed?.?out", "timeout"),
        (r"(?i)connection.?refused", "connection_refused"),
        (r"(?i)syntax.?error", "syntax_error"),
        (r"(?i)type.?error", "type_error"),
        (r"(?i)not.?found|404", "not_found"),
        (r"(?i)ENOENT", "file_not_found"),
        (r"(?i)EACCES", "access_denied"),
        (r"(?i)npm ERR!", "npm_error"),
        (r"(?i)pip.*(error|failed)", "pip_error"),
        (r"(?i)git.*(error|fatal)", "git_error"),
        (r"(?i)docker.*(error|failed)", "docker_error"),
    ]
    .into_iter()
    .filter_map(|(pattern, label)| Regex::new(pattern).ok().map(|re| (re, label)))
    .collect()
});

static PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/[\w/.\-]+").unwrap_or_else(|_| unreachable!()));
static LINE_NO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\d+").unwrap_or_else(|_| unreachable!()));
static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"]*""#).unwrap_or_else(|_| unreachable!()));

/// Normalize an input summary for signature comparison: absolute paths to
/// `/PATH`, line numbers to `:N`, quoted contents to `"..."`, capped at 100
/// characters.
pub fn normalize_input(input: &str) -> String {
    let normalized = PATH_RE.replace_all(input, "/PATH");
    let normalized = LINE_NO_RE.replace_all(&normalized, ":N");
    let normalized = QUOTED_RE.replace_all(&normalized, "\"...\"");
    truncate(&normalized, 100)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

fn tool_domain(tool: &str) -> &'static str {
    match tool {
        "Bash" => "shell",
        "Read" | "Write" | "Edit" => "files",
        "Glob" | "Grep" => "search",
        "Task" => "agents",
        "WebFetch" | "WebSearch" => "web",
        _ => "general",
    }
}

/// Keyword-to-domain overrides checked against the input summary.
const KEYWORD_DOMAINS: &[(&str, &str)] = &[
    ("npm", "nodejs"),
    ("node", "nodejs"),
    ("pip", "python"),
    ("python", "python"),
    ("pytest", "python"),
    ("cargo", "rust"),
    ("git", "git"),
    ("docker", "docker"),
    ("test", "testing"),
    ("react", "react"),
    ("api", "api"),
    ("database", "database"),
    ("sql", "database"),
];

fn infer_domain(event: &SessionEvent) -> String {
    let input = event.input_summary.to_lowercase();
    for (keyword, domain) in KEYWORD_DOMAINS {
        if input.contains(keyword) {
            return (*domain).to_string();
        }
    }
    tool_domain(&event.tool).to_string()
}

fn error_signature(output: &str) -> Option<String> {
    if output.is_empty() {
        return None;
    }
    for (re, label) in ERROR_CATALOG.iter() {
        if re.is_match(output) {
            return Some((*label).to_string());
        }
    }
    // Fallback: first non-empty line, truncated
    output.lines().map(str::trim).find(|l| !l.is_empty()).map(|l| truncate(l, 80))
}

/// Extract the five pattern kinds from one session's sorted events.
pub struct PatternExtractor {
    events: Vec<SessionEvent>,
    session_id: String,
    project_path: Option<String>,
}

impl PatternExtractor {
    pub fn new(
        events: Vec<SessionEvent>,
        session_id: &str,
        project_path: Option<&str>,
    ) -> Self {
        Self {
            events,
            session_id: session_id.to_string(),
            project_path: project_path.map(str::to_string),
        }
    }

    pub fn extract_all(&self) -> Vec<ExtractedPattern> {
        let mut patterns = Vec::new();
        patterns.extend(self.extract_retries());
        patterns.extend(self.extract_errors());
        patterns.extend(self.extract_searches());
        patterns.extend(self.extract_success_sequences());
        patterns.extend(self.extract_tool_sequences());
        patterns
    }

    fn pattern(
        &self,
        kind: PatternKind,
        text: String,
        signature: String,
        domain: String,
        occurrence_count: i64,
    ) -> ExtractedPattern {
        ExtractedPattern {
            kind,
            pattern_text: text,
            signature,
            domain,
            occurrence_count,
            session_ids: vec![self.session_id.clone()],
            project_path: self.project_path.clone(),
        }
    }

    /// Failure followed within the retry window by a same-tool call whose
    /// normalized input shares a prefix (or first token, for shell calls).
    fn extract_retries(&self) -> Vec<ExtractedPattern> {
        let mut patterns = Vec::new();

        for (i, event) in self.events.iter().enumerate() {
            if event.outcome != Outcome::Failure {
                continue;
            }
            let failure_input = normalize_input(&event.input_summary);

            let lookahead_end = (i + 10).min(self.events.len());
            for candidate in &self.events[i + 1..lookahead_end] {
                let delta = (candidate.ts - event.ts).num_seconds();
                if delta > RETRY_WINDOW_SECONDS {
                    break;
                }
                if candidate.tool != event.tool {
                    continue;
                }
                let retry_input = normalize_input(&candidate.input_summary);

                let prefix_match = shared_prefix(&failure_input, &retry_input, 30);
                let token_match = event.tool == "Bash"
                    && failure_input.split_whitespace().next()
                        == retry_input.split_whitespace().next();
                if prefix_match || token_match {
                    let difference = truncate(&candidate.input_summary, 100);
                    patterns.push(self.pattern(
                        PatternKind::Retry,
                        format!("When {} fails, retry with: {difference}", event.tool),
                        format!("{}:{}", event.tool, truncate(&failure_input, 50)),
                        infer_domain(event),
                        1,
                    ));
                    break; // only the first retry of each failure
                }
            }
        }
        patterns
    }

    /// Errors bucketed by normalized signature; fires at two occurrences.
    fn extract_errors(&self) -> Vec<ExtractedPattern> {
        let mut buckets: HashMap<String, Vec<&SessionEvent>> = HashMap::new();
        for event in &self.events {
            if event.outcome != Outcome::Failure {
                continue;
            }
            if let Some(sig) = event.output_summary.as_deref().and_then(error_signature) {
                buckets.entry(sig).or_default().push(event);
            }
        }

        let mut patterns: Vec<ExtractedPattern> = buckets
            .into_iter()
            .filter(|(_, events)| events.len() >= MIN_ERROR_OCCURRENCES)
            .map(|(sig, events)| {
                let first = events[0];
                self.pattern(
                    PatternKind::Error,
                    format!("Common error with {}: {sig}", first.tool),
                    format!("error:{sig}:{}", first.tool),
                    infer_domain(first),
                    events.len() as i64,
                )
            })
            .collect();
        patterns.sort_by(|a, b| a.signature.cmp(&b.signature));
        patterns
    }

    /// A Grep/Glob followed by at least two Reads before the next search.
    fn extract_searches(&self) -> Vec<ExtractedPattern> {
        let mut patterns = Vec::new();
        let is_search = |tool: &str| matches!(tool, "Grep" | "Glob");

        for (i, event) in self.events.iter().enumerate() {
            if !is_search(&event.tool) {
                continue;
            }

            let mut read_count = 0usize;
            let lookahead_end = (i + 20).min(self.events.len());
            for next in &self.events[i + 1..lookahead_end] {
                if next.tool == "Read" {
                    read_count += 1;
                } else if is_search(&next.tool) {
                    break;
                }
            }

            if read_count >= MIN_SEARCH_READS {
                let search_input = truncate(&event.input_summary, 50);
                patterns.push(self.pattern(
                    PatternKind::Search,
                    format!("Search '{search_input}' leads to reading {read_count} files"),
                    format!("search:{}:{read_count}", normalize_input(&event.input_summary)),
                    "search".to_string(),
                    read_count as i64,
                ));
            }
        }
        patterns
    }

    /// A successful `git commit` preceded by a chain of successful calls.
    fn extract_success_sequences(&self) -> Vec<ExtractedPattern> {
        let mut patterns = Vec::new();

        for (i, event) in self.events.iter().enumerate() {
            if event.tool != "Bash"
                || event.outcome != Outcome::Success
                || !event.input_summary.to_lowercase().contains("git commit")
            {
                continue;
            }

            let window_start = i.saturating_sub(10);
            let preceding: Vec<&str> = self.events[window_start..i]
                .iter()
                .filter(|e| e.outcome == Outcome::Success)
                .map(|e| e.tool.as_str())
                .collect();

            if preceding.len() >= MIN_SUCCESS_CHAIN {
                let tail = &preceding[preceding.len().saturating_sub(5)..];
                patterns.push(self.pattern(
                    PatternKind::SuccessSequence,
                    format!("Successful commit after: {}", tail.join(" → ")),
                    format!("success_seq:{}", tail.join(":")),
                    "git".to_string(),
                    1,
                ));
            }
        }
        patterns
    }

    /// Adjacent tool pairs repeated at least five times in the window.
    fn extract_tool_sequences(&self) -> Vec<ExtractedPattern> {
        let mut transitions: HashMap<(String, String), usize> = HashMap::new();
        for pair in self.events.windows(2) {
            if pair[0].tool.is_empty() || pair[1].tool.is_empty() {
                continue;
            }
            *transitions.entry((pair[0].tool.clone(), pair[1].tool.clone())).or_default() += 1;
        }

        let mut patterns: Vec<ExtractedPattern> = transitions
            .into_iter()
            .filter(|(_, count)| *count >= MIN_PAIR_COUNT)
            .map(|((from, to), count)| {
                self.pattern(
                    PatternKind::ToolSequence,
                    format!("Common sequence: {from}→{to} ({count} times)"),
                    format!("tool_seq:{from}→{to}"),
                    "workflow".to_string(),
                    count as i64,
                )
            })
            .collect();
        patterns.sort_by(|a, b| a.signature.cmp(&b.signature));
        patterns
    }
}

fn shared_prefix(a: &str, b: &str, len: usize) -> bool {
    let a_prefix: String = a.chars().take(len).collect();
    let b_prefix: String = b.chars().take(len).collect();
    !a_prefix.is_empty() && a_prefix == b_prefix
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn event(offset_secs: i64, tool: &str, input: &str, outcome: Outcome) -> SessionEvent {
        SessionEvent {
            ts: Utc.with_ymd_and_hms(2026, 7, 1, 10, 0, 0).unwrap() + Duration::seconds(offset_secs),
            tool: tool.to_string(),
            input_summary: input.to_string(),
            output_summary: None,
            outcome,
        }
    }

    fn failing(offset_secs: i64, tool: &str, input: &str, output: &str) -> SessionEvent {
        SessionEvent {
            output_summary: Some(output.to_string()),
            ..event(offset_secs, tool, input, Outcome::Failure)
        }
    }

    fn extractor(events: Vec<SessionEvent>) -> PatternExtractor {
        PatternExtractor::new(events, "test-session", None)
    }

    #[test]
    fn normalize_strips_paths_lines_and_quotes() {
        assert_eq!(
            normalize_input("Read /home/user/project/src/main.rs:42"),
            "Read /PATH:N"
        );
        assert_eq!(normalize_input(r#"grep "secret token" src"#), r#"grep "..." src"#);
        assert!(normalize_input(&"x".repeat(300)).len() <= 100);
    }

    #[test]
    fn retry_pattern_within_window() {
        let events = vec![
            event(0, "Bash", "cargo test --lib", Outcome::Failure),
            event(30, "Bash", "cargo test --lib -- --nocapture", Outcome::Success),
        ];
        let patterns = extractor(events).extract_all();
        let retries: Vec<_> =
            patterns.iter().filter(|p| p.kind == PatternKind::Retry).collect();
        assert_eq!(retries.len(), 1);
        assert!(retries[0].pattern_text.starts_with("When Bash fails, retry with:"));
        assert_eq!(retries[0].domain, "rust");
    }

    #[test]
    fn retry_outside_window_is_ignored() {
        let events = vec![
            event(0, "Bash", "cargo test", Outcome::Failure),
            event(200, "Bash", "cargo test", Outcome::Success),
        ];
        let patterns = extractor(events).extract_all();
        assert!(patterns.iter().all(|p| p.kind != PatternKind::Retry));
    }

    #[test]
    fn error_pattern_requires_two_occurrences() {
        let events = vec![
            failing(0, "Bash", "npm install", "EACCES: permission denied"),
            failing(10, "Bash", "npm install x", "permission denied while opening"),
            failing(20, "Bash", "docker run", "connection refused"),
        ];
        let patterns = extractor(events).extract_all();
        let errors: Vec<_> = patterns.iter().filter(|p| p.kind == PatternKind::Error).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].signature.starts_with("error:permission_denied:"));
        assert_eq!(errors[0].occurrence_count, 2);
    }

    #[test]
    fn search_then_reads_fires_at_two_reads() {
        let events = vec![
            event(0, "Grep", "fn handle_request", Outcome::Success),
            event(5, "Read", "src/server.rs", Outcome::Success),
            event(10, "Read", "src/routes.rs", Outcome::Success),
            event(15, "Grep", "other search", Outcome::Success),
        ];
        let patterns = extractor(events).extract_all();
        let searches: Vec<_> =
            patterns.iter().filter(|p| p.kind == PatternKind::Search).collect();
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].occurrence_count, 2);
    }

    #[test]
    fn success_sequence_before_commit() {
        let events = vec![
            event(0, "Read", "src/lib.rs", Outcome::Success),
            event(10, "Edit", "src/lib.rs", Outcome::Success),
            event(20, "Bash", "cargo test", Outcome::Success),
            event(30, "Bash", "git add -A", Outcome::Success),
            event(40, "Bash", "git commit -m 'fix'", Outcome::Success),
        ];
        let patterns = extractor(events).extract_all();
        let sequences: Vec<_> =
            patterns.iter().filter(|p| p.kind == PatternKind::SuccessSequence).collect();
        assert_eq!(sequences.len(), 1);
        assert!(sequences[0].pattern_text.contains("Successful commit after:"));
        assert_eq!(sequences[0].domain, "git");
    }

    #[test]
    fn tool_pair_fires_at_five_repeats() {
        let mut events = Vec::new();
        for i in 0..5 {
            events.push(event(i * 20, "Grep", "q", Outcome::Success));
            events.push(event(i * 20 + 10, "Read", "f", Outcome::Success));
        }
        let patterns = extractor(events).extract_all();
        let pairs: Vec<_> =
            patterns.iter().filter(|p| p.kind == PatternKind::ToolSequence).collect();
        assert!(pairs.iter().any(|p| p.signature == "tool_seq:Grep→Read"));
    }
}
