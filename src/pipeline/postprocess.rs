//! Post-processing: deterministic cleanup of page text and model answers.
//!
//! Native text layers and tesseract output both carry noise that is
//! irrelevant to question answering (form feeds, CRLF line endings, trailing
//! blanks, zero-width characters). Model answers occasionally arrive wrapped
//! in a markdown fence despite the prompt. The rules here fix those quirks
//! without touching content, and each one is a pure `&str → String` pass.
//!
//! ## Rule Order
//!
//! Line endings are normalised before any line-based rule runs, and fences
//! are stripped before the answer is trimmed so the fence detection sees the
//! raw output.

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean one page of extracted text.
///
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Drop form feeds (tesseract ends every page with one)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 2
/// 6. Trim leading/trailing blank lines
pub fn clean_page_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = s.replace('\x0c', "");
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim_matches('\n').to_string()
}

/// Clean a model answer while keeping its line structure.
///
/// 1. Strip an outer ```` ``` ```` fence
/// 2. Normalise line endings
/// 3. Strip invisible Unicode
/// 4. Trim surrounding whitespace
pub fn clean_answer(input: &str) -> String {
    let s = strip_outer_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

/// Collapse an answer into a single paragraph.
///
/// Each line is trimmed, empty lines are dropped, the rest are joined with
/// single spaces and runs of spaces are collapsed.
pub fn flatten_answer(input: &str) -> String {
    let joined = input
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    RE_MULTI_SPACE.replace_all(&joined, " ").trim().to_string()
}

/// Count of non-whitespace characters: the density measure behind the OCR
/// decision.
pub fn non_whitespace_char_count(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

// ── Rules ────────────────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\r?\n(.*)\r?\n```\s*$").expect("static regex"));

fn strip_outer_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").expect("static regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

static RE_MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").expect("static regex"));

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Tests ────────────────────────────────────────────────────────────────────
