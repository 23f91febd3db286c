//! Dry-run previews of pending replacements
//!
//! Rendering is pure: it never evaluates the replacement template, so a
//! regex template such as `$1` is shown exactly as typed.

use super::matcher::Match;
use super::orchestrator::NoteMatch;
use std::fmt::Write;

/// Lines of context shown before and after each match
pub const CONTEXT_LINES: usize = 3;

/// The parts of a body surrounding one match
#[derive(Debug, PartialEq, Eq)]
struct Context<'a> {
    /// 1-based line the match starts on
    line: usize,
    /// Whole lines preceding the match line
    before: Vec<&'a str>,
    /// Text on the match's first line before the match
    prefix: &'a str,
    /// Text on the match's last line after the match
    suffix: &'a str,
    /// Whole lines following the match's last line
    after: Vec<&'a str>,
}

/// Byte span of every line in `text`, newline excluded
fn line_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for line in text.split('\n') {
        spans.push((start, start + line.len()));
        start += line.len() + 1;
    }
    spans
}

/// Index of the first line at or after `from` whose span (plus its newline) holds `offset`
fn line_containing(spans: &[(usize, usize)], offset: usize, from: usize) -> usize {
    spans
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, (_, end))| offset <= *end)
        .map_or(spans.len() - 1, |(i, _)| i)
}

fn context<'a>(text: &'a str, m: &Match) -> Context<'a> {
    let spans = line_spans(text);
    let first = line_containing(&spans, m.start, 0);
    // A match ending in a newline finishes on that newline's line
    let last_byte = if m.end > m.start { m.end - 1 } else { m.end };
    let last = line_containing(&spans, last_byte, first);

    let window_start = first.saturating_sub(CONTEXT_LINES);
    let window_end = (last + 1 + CONTEXT_LINES).min(spans.len());

    Context {
        line: first + 1,
        before: lines(text, &spans[window_start..first]),
        prefix: &text[spans[first].0..m.start],
        suffix: text.get(m.end..spans[last].1).unwrap_or(""),
        after: lines(text, &spans[last + 1..window_end]),
    }
}

fn lines<'a>(text: &'a str, spans: &[(usize, usize)]) -> Vec<&'a str> {
    spans.iter().map(|&(start, end)| &text[start..end]).collect()
}

/// Keep continuation lines of a multi-line fragment under the preview indent
fn indent_continuation(fragment: &str) -> String {
    fragment.replace('\n', "\n  ")
}

/// Preview every match in one note
pub fn render_preview(note_match: &NoteMatch, replacement: &str) -> String {
    let note = &note_match.note;
    let mut out = String::new();

    let _ = writeln!(out, "=== Note: {} ===", note.title);
    let _ = writeln!(out, "ID: {}", note.id);
    if let Some(modified) = chrono::DateTime::from_timestamp_millis(note.updated_time)
        .filter(|_| note.updated_time > 0)
    {
        let _ = writeln!(out, "Modified: {}", modified.format("%Y-%m-%d %H:%M"));
    }
    let _ = writeln!(out, "Matches: {}", note_match.matches.len());

    for (i, m) in note_match.matches.iter().enumerate() {
        let ctx = context(&note.body, m);

        let _ = writeln!(out);
        let _ = writeln!(out, "Match {} (line {}):", i + 1, ctx.line);
        for line in &ctx.before {
            let _ = writeln!(out, "  {}", line);
        }
        let _ = writeln!(
            out,
            "  {}[-{}-]{{+{}+}}{}",
            ctx.prefix,
            indent_continuation(&m.text),
            indent_continuation(replacement),
            ctx.suffix
        );
        for line in &ctx.after {
            let _ = writeln!(out, "  {}", line);
        }
    }

    out
}

/// Preview all matched notes, separated by blank lines
pub fn render_all(matched: &[NoteMatch], replacement: &str) -> String {
    if matched.is_empty() {
        return "No matches found\n".to_string();
    }

    matched
        .iter()
        .map(|nm| render_preview(nm, replacement))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line per note: title and match count
pub fn render_summary(matched: &[NoteMatch]) -> String {
    let mut out = String::from("Matches by note:\n");
    for nm in matched {
        let noun = if nm.matches.len() == 1 { "match" } else { "matches" };
        let _ = writeln!(out, "  {} ({} {})", nm.note.title, nm.matches.len(), noun);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replacer::matcher::{Matcher, PatternSpec};
    use crate::store::Note;

    fn note_match(body: &str, pattern: PatternSpec) -> NoteMatch {
        let matcher = Matcher::new(&pattern).unwrap();
        NoteMatch {
            matches: matcher.find_all_matches(body),
            note: Note::new("id1", "Groceries", body),
        }
    }

    #[test]
    fn test_context_clamped_at_start() {
        let body = "first foo line\nsecond\nthird";
        let nm = note_match(body, PatternSpec::literal("foo"));
        let ctx = context(body, &nm.matches[0]);

        assert_eq!(ctx.line, 1);
        assert!(ctx.before.is_empty());
        assert_eq!(ctx.prefix, "first ");
        assert_eq!(ctx.suffix, " line");
        assert_eq!(ctx.after, vec!["second", "third"]);
    }

    #[test]
    fn test_context_window_is_three_lines() {
        let body = "1\n2\n3\n4\n5\nTARGET\n7\n8\n9\n10";
        let nm = note_match(body, PatternSpec::literal("TARGET"));
        let ctx = context(body, &nm.matches[0]);

        assert_eq!(ctx.line, 6);
        assert_eq!(ctx.before, vec!["3", "4", "5"]);
        assert_eq!(ctx.after, vec!["7", "8", "9"]);
    }

    #[test]
    fn test_context_multiline_match() {
        let body = "a\nb\nstart x\ny\nz end\nc\nd";
        let nm = note_match(body, PatternSpec::regex("x.*z"));
        let ctx = context(body, &nm.matches[0]);

        assert_eq!(ctx.line, 3);
        assert_eq!(ctx.before, vec!["a", "b"]);
        assert_eq!(ctx.prefix, "start ");
        assert_eq!(ctx.suffix, " end");
        assert_eq!(ctx.after, vec!["c", "d"]);
    }

    #[test]
    fn test_context_match_at_end_of_body() {
        let body = "one\ntwo foo";
        let nm = note_match(body, PatternSpec::literal("foo"));
        let ctx = context(body, &nm.matches[0]);

        assert_eq!(ctx.line, 2);
        assert_eq!(ctx.before, vec!["one"]);
        assert_eq!(ctx.suffix, "");
        assert!(ctx.after.is_empty());
    }

    #[test]
    fn test_context_match_ending_in_newline() {
        let body = "keep\nTODO: a\nnext line\nlast";
        let nm = note_match(body, PatternSpec::regex("TODO:.*?\n"));
        let ctx = context(body, &nm.matches[0]);

        assert_eq!(ctx.line, 2);
        assert_eq!(ctx.prefix, "");
        assert_eq!(ctx.suffix, "");
        assert_eq!(ctx.after, vec!["next line", "last"]);
    }

    #[test]
    fn test_render_preview_indents_multiline_match() {
        let body = "intro\nstart x\ny\nz end\noutro";
        let nm = note_match(body, PatternSpec::regex("x.*z"));
        let out = render_preview(&nm, "X\nZ");

        assert!(out.contains("  start [-x\n  y\n  z-]{+X\n  Z+} end\n"));
        assert!(out.contains("\n  intro\n"));
        assert!(out.contains("\n  outro\n"));
    }

    #[test]
    fn test_render_preview_shows_raw_template() {
        let body = "call me at 555-1234 today";
        let nm = note_match(body, PatternSpec::regex(r"(\d{3})-(\d{4})"));
        let out = render_preview(&nm, "$2-$1");

        assert!(out.contains("=== Note: Groceries ==="));
        assert!(out.contains("ID: id1"));
        assert!(out.contains("Matches: 1"));
        assert!(out.contains("call me at [-555-1234-]{+$2-$1+} today"));
        assert!(!out.contains("Modified:"));
    }

    #[test]
    fn test_render_preview_numbers_matches() {
        let body = "foo\nbar\nfoo";
        let nm = note_match(body, PatternSpec::literal("foo"));
        let out = render_preview(&nm, "baz");

        assert!(out.contains("Match 1 (line 1):"));
        assert!(out.contains("Match 2 (line 3):"));
        assert!(out.contains("Matches: 2"));
    }

    #[test]
    fn test_render_preview_modified_time() {
        let mut nm = note_match("foo", PatternSpec::literal("foo"));
        nm.note.updated_time = 1_700_000_000_000;
        let out = render_preview(&nm, "bar");
        assert!(out.contains("Modified: 2023-11-14"));
    }

    #[test]
    fn test_render_all_empty() {
        assert_eq!(render_all(&[], "x"), "No matches found\n");
    }

    #[test]
    fn test_render_summary() {
        let matched = vec![
            note_match("foo foo", PatternSpec::literal("foo")),
            note_match("foo", PatternSpec::literal("foo")),
        ];
        let out = render_summary(&matched);

        assert!(out.starts_with("Matches by note:\n"));
        assert!(out.contains("  Groceries (2 matches)\n"));
        assert!(out.contains("  Groceries (1 match)\n"));
    }
}
