//! Telegram HTML structure: open-tag tracking, balancing, and cut points.
//!
//! Only the tags Telegram understands are tracked. Anything else that looks
//! like a tag is treated as text and left alone. None of these functions
//! fail; malformed input produces the best structure we can infer.

use regex::Regex;
use std::fmt::Write as _;
use std::sync::LazyLock;

/// Tags Telegram's HTML parse mode accepts.
pub const SUPPORTED_TAGS: &[&str] = &[
    "b",
    "strong",
    "i",
    "em",
    "u",
    "ins",
    "s",
    "strike",
    "del",
    "code",
    "pre",
    "a",
    "tg-spoiler",
    "blockquote",
];

/// Longest entity body we recognise (`&#x1F600;` and friends).
const MAX_ENTITY_LEN: usize = 10;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(/?)([\w-]+)(?:\s[^>]*)?>").expect("invalid regex"));

static ANY_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("invalid regex"));

fn is_supported(name: &str) -> bool {
    SUPPORTED_TAGS.contains(&name)
}

/// Open-tag stack of `text`: `(lower-cased name, opening tag as written)`.
fn open_tag_stack(text: &str) -> Vec<(String, &str)> {
    let mut stack: Vec<(String, &str)> = Vec::new();

    for cap in TAG_RE.captures_iter(text) {
        let name = cap[2].to_lowercase();
        if !is_supported(&name) {
            continue;
        }

        if &cap[1] == "/" {
            if stack.last().is_some_and(|(top, _)| *top == name) {
                stack.pop();
            } else if let Some(pos) = stack.iter().position(|(open, _)| *open == name) {
                stack.remove(pos);
            }
            // A closer with nothing to close is ignored.
        } else {
            let markup = cap.get(0).map_or("", |m| m.as_str());
            stack.push((name, markup));
        }
    }

    stack
}

/// Tags opened but not closed in `text`, outermost first.
///
/// A closer pops its tag when it is on top of the stack; otherwise it
/// removes the first matching entry. Unknown tags and unmatched closers are
/// ignored.
#[must_use]
pub fn find_open_tags(text: &str) -> Vec<String> {
    open_tag_stack(text)
        .into_iter()
        .map(|(name, _)| name)
        .collect()
}

/// The opening tags (attributes included) still open at the end of `text`,
/// concatenated outermost first.
///
/// Prepending this to a suffix of `text` restores the nesting context the
/// suffix was cut out of.
#[must_use]
pub fn reopening_tags(text: &str) -> String {
    open_tag_stack(text)
        .into_iter()
        .map(|(_, markup)| markup)
        .collect()
}

/// Close every tag left open in `text`, innermost first.
///
/// Idempotent: `balance(&balance(t)) == balance(t)`.
#[must_use]
pub fn balance(text: &str) -> String {
    let open = find_open_tags(text);
    if open.is_empty() {
        return text.to_string();
    }

    let mut result = text.to_string();
    for tag in open.iter().rev() {
        let _ = write!(result, "</{tag}>");
    }
    result
}

/// If `point` lies inside `<...>`, the index of that `<`.
fn enclosing_tag_start(text: &str, point: usize) -> Option<usize> {
    let before = &text.as_bytes()[..point];
    let lt = before.iter().rposition(|&b| b == b'<')?;
    match before.iter().rposition(|&b| b == b'>') {
        Some(gt) if gt > lt => None,
        _ => Some(lt),
    }
}

/// If `point` lies inside `&...;`, the index of that `&`.
fn enclosing_entity_start(text: &str, point: usize) -> Option<usize> {
    let before = &text.as_bytes()[..point];
    let amp = before.iter().rposition(|&b| b == b'&')?;
    let body = &before[amp.saturating_add(1)..];
    let in_entity = body.len() < MAX_ENTITY_LEN
        && body.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'#');
    in_entity.then_some(amp)
}

/// Largest index `<= target` that does not split a tag, an entity, or a
/// UTF-8 character.
#[must_use]
pub fn safe_cut_point(text: &str, target: usize) -> usize {
    let mut point = text.floor_char_boundary(target.min(text.len()));
    loop {
        // An entity inside an attribute moves us to its `&`, which may still
        // be inside the tag, so iterate until stable.
        let adjusted = enclosing_tag_start(text, point)
            .or_else(|| enclosing_entity_start(text, point))
            .unwrap_or(point);
        if adjusted == point {
            return point;
        }
        point = adjusted;
    }
}

/// Where to cut `text` so that `text[..point]` is a clean prefix, with
/// `point <= target`.
///
/// Never splits a tag or entity. Prefers the nearest preceding newline, then
/// the nearest preceding space, then the raw safe point.
#[must_use]
pub fn safe_truncate_point(text: &str, target: usize) -> usize {
    if target >= text.len() {
        return text.len();
    }

    let cut = safe_cut_point(text, target);
    let head = &text[..cut];
    let clean = |pos: &usize| *pos > 0 && safe_cut_point(text, *pos) == *pos;

    if let Some(pos) = head.rmatch_indices('\n').map(|(i, _)| i).find(clean) {
        return pos;
    }
    if let Some(pos) = head.rmatch_indices(' ').map(|(i, _)| i).find(clean) {
        return pos;
    }
    cut
}

/// Remove all markup, leaving readable plain text.
///
/// Every `<...>` sequence goes, and the basic entities are decoded.
#[must_use]
pub fn strip_markup(text: &str) -> String {
    ANY_TAG_RE
        .replace_all(text, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}
