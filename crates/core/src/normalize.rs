//! Corpus-specific text cleanup applied before tokenization.
//!
//! * [`clean_wikitext`] undoes the tokenised spacing of WikiText dumps
//!   (`@-@` separators, spaced punctuation, `= = Heading = =` markers).
//! * [`clean_lambada`] straightens curly quotes and trims the sentence ends
//!   of a LAMBADA passage.
//!
//! The wiki rules run in a fixed order: bracket un-spacing must see the
//! punctuation already collapsed, and heading markers are collapsed after the
//! quote rules so `'` pairs inside headings are not disturbed.

use once_cell::sync::Lazy;
use regex::Regex;

static PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*([^\)]*?)\s*\)").unwrap());
static BRACKET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\s*([^\]]*?)\s*\]").unwrap());
static BRACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\s*([^\}]*?)\s*\}").unwrap());
static DQUOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""\s*([^"]*?)\s*""#).unwrap());
static SQUOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"'\s*([^']*?)\s*'").unwrap());

/// Literal substitutions, in application order.
const NUMBER_SEPARATORS: [(&str, &str); 3] = [(" @-@ ", "-"), (" @,@ ", ","), (" @.@ ", ".")];

const SPACED_PUNCTUATION: [(&str, &str); 6] = [
    (" : ", ": "),
    (" ; ", "; "),
    (" . ", ". "),
    (" ! ", "! "),
    (" ? ", "? "),
    (" , ", ", "),
];

// Longest marker first, otherwise `= = = =` would become `== ==`.
const HEADING_MARKERS: [(&str, &str); 3] = [("= = = =", "===="), ("= = =", "==="), ("= =", "==")];

const MISC: [(&str, &str); 5] = [
    (" \u{00B0} ", "\u{00B0}"),
    (" \n", "\n"),
    ("\n ", "\n"),
    (" N ", " 1 "),
    (" 's", "'s"),
];

/// Apply each rule until its pattern no longer occurs.
///
/// A single `str::replace` pass misses overlapping matches (`" N N "`), so
/// every rule runs to a fixed point. Each rule shrinks the text or removes a
/// pattern occurrence, so the loop terminates.
fn replace_all(mut text: String, rules: &[(&str, &str)]) -> String {
    for (from, to) in rules {
        while text.contains(from) {
            text = text.replace(from, to);
        }
    }
    text
}

fn unspace_pairs(text: String) -> String {
    let text = PAREN_RE.replace_all(&text, "(${1})");
    let text = BRACKET_RE.replace_all(&text, "[${1}]");
    let text = BRACE_RE.replace_all(&text, "{${1}}");
    let text = DQUOTE_RE.replace_all(&text, "\"${1}\"");
    SQUOTE_RE.replace_all(&text, "'${1}'").into_owned()
}

/// Clean a WikiText dump. Returns a new string; the input is untouched.
pub fn clean_wikitext(text: &str) -> String {
    let text = text.replace("s '", "s'");
    let text = replace_all(text, &NUMBER_SEPARATORS);
    let text = replace_all(text, &SPACED_PUNCTUATION);
    let text = unspace_pairs(text);
    let text = replace_all(text, &HEADING_MARKERS);
    replace_all(text, &MISC)
}

/// True for a WikiText paragraph that is a section header (`= Title =`).
pub fn is_wiki_heading(paragraph: &str) -> bool {
    paragraph.trim().starts_with('=')
}

fn trim_sentence_ends(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || c == '.')
}

/// Clean one LAMBADA passage: `“Hello.”` becomes `Hello`.
///
/// Curly double quotes are straightened, whitespace and periods are trimmed
/// from both ends, and a pair of double quotes wrapping the whole passage is
/// removed. A quote that opens or closes only part of the passage is kept.
pub fn clean_lambada(text: &str) -> String {
    let straight = text.replace(['\u{201C}', '\u{201D}'], "\"");
    let trimmed = trim_sentence_ends(&straight);
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map_or(trimmed, trim_sentence_ends);
    unquoted.to_string()
}
