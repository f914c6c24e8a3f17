//! Match Engine — applies bound patterns to a line and renders the alert
//! payload described in the external interfaces section.

use chrono::{DateTime, Local};

use crate::context::ContextBuffer;
use crate::pattern::{FilePatternBinding, PatternSet};

/// Which sink family a job targets. The Match Engine always enqueues one of
/// each per admitted match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkSelector {
    /// The configured multi-channel fan-out (email/Slack/Teams/Telegram).
    MultiChannel,
    /// The remote syslog sink.
    Syslog,
}

/// A single unit of alert work, created by the Match Engine once a match has
/// been rate-limit-admitted. Destroyed once a terminal outcome is recorded.
#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub sink_selector: SinkSelector,
    pub rendered_message: String,
    pub pattern_name: String,
    pub enqueue_time: DateTime<Local>,
    pub attempts: u32,
}

impl NotificationJob {
    pub fn new(sink_selector: SinkSelector, rendered_message: String, pattern_name: String) -> Self {
        Self {
            sink_selector,
            rendered_message,
            pattern_name,
            enqueue_time: Local::now(),
            attempts: 0,
        }
    }
}

/// Outcome of evaluating one line against the patterns bound to its file.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub pattern_name: String,
    pub rendered_message: String,
}

/// Render the fixed-format alert body for a match.
///
/// `context` must already include the matching line (the Tailer pushes it
/// before invoking the Match Engine).
pub fn render_match(path: &str, pattern_name: &str, line: &str, context: &ContextBuffer) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!(
        "=== LogWatcher Match ===\n\
         Time: {timestamp}\n\
         File: {path}\n\
         Pattern: {pattern_name}\n\
         Match: {line}\n\
         Recent context:\n\
         {context}\n\
         =======================",
        context = context.joined(),
    )
}

/// Evaluate every pattern bound to `path` against `line`, pushing the line
/// into `context` first so a match's context includes it. Returns one
/// [`MatchOutcome`] per bound pattern that matched; rate limiting and job
/// construction happen at the call site (the Tailer), which owns the shared
/// RateLimiter and NotificationQueue handles.
pub fn evaluate_line(
    path: &str,
    line: &str,
    patterns: &PatternSet,
    bindings: &FilePatternBinding,
    context: &mut ContextBuffer,
) -> Vec<MatchOutcome> {
    context.push(line.to_string());

    bindings
        .patterns_for(path)
        .iter()
        .filter_map(|name| patterns.get(name))
        .filter(|pattern| pattern.is_match(line))
        .map(|pattern| MatchOutcome {
            pattern_name: pattern.name.clone(),
            rendered_message: render_match(path, &pattern.name, line, context),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_expected_format() {
        let mut context = ContextBuffer::new(3);
        context.push("A");
        context.push("B");
        context.push("ERROR boom");
        let rendered = render_match("/var/log/app.log", "err", "ERROR boom", &context);
        assert!(rendered.starts_with("=== LogWatcher Match ===\n"));
        assert!(rendered.contains("File: /var/log/app.log\n"));
        assert!(rendered.contains("Pattern: err\n"));
        assert!(rendered.contains("Match: ERROR boom\n"));
        assert!(rendered.contains("Recent context:\nA\nB\nERROR boom\n"));
        assert!(rendered.ends_with("======================="));
    }

    #[test]
    fn evaluates_only_bound_patterns() {
        let patterns = PatternSet::build([("err", "ERROR"), ("warn", "WARN")]).unwrap();
        let bindings = FilePatternBinding::build([("a.log", vec!["err"])]);
        let mut context = ContextBuffer::new(20);

        let matches = evaluate_line("a.log", "an ERROR occurred", &patterns, &bindings, &mut context);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].pattern_name, "err");

        let matches = evaluate_line("a.log", "a WARN occurred", &patterns, &bindings, &mut context);
        assert!(matches.is_empty());
    }

    #[test]
    fn unbound_file_never_matches() {
        let patterns = PatternSet::build([("err", "ERROR")]).unwrap();
        let bindings = FilePatternBinding::build(Vec::<(&str, Vec<&str>)>::new());
        let mut context = ContextBuffer::new(20);
        let matches = evaluate_line("b.log", "an ERROR occurred", &patterns, &bindings, &mut context);
        assert!(matches.is_empty());
    }

    #[test]
    fn multiple_bound_patterns_each_evaluated_independently() {
        let patterns = PatternSet::build([("err", "ERROR"), ("boom", "boom")]).unwrap();
        let bindings = FilePatternBinding::build([("a.log", vec!["err", "boom"])]);
        let mut context = ContextBuffer::new(20);
        let matches = evaluate_line("a.log", "ERROR: boom detected", &patterns, &bindings, &mut context);
        assert_eq!(matches.len(), 2);
    }
}
