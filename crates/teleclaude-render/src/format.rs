//! Markdown to Telegram HTML, message chunking, and the HTML fragments the
//! bridge renders for tool calls, tool results, code, and approval prompts.

use regex::Regex;
use std::fmt::Write as _;
use std::sync::LazyLock;

use teleclaude_core::ToolInput;
use teleclaude_core::utils::truncate_to_boundary;

use crate::markup::{balance, reopening_tags, safe_truncate_point, strip_markup};
use crate::truncate::truncate_lines;

/// Maximum message length for Telegram (with some margin below 4096).
const MAX_MESSAGE_LEN: usize = 4000;

/// Room kept free in each chunk for the closers `balance` appends.
const CLOSING_TAG_HEADROOM: usize = 50;

/// Tool results longer than this are shortened.
pub const MAX_RESULT_LEN: usize = 2000;

/// Code blocks longer than this many lines are shortened.
pub const MAX_CODE_LINES: usize = 50;

/// Lines containing any of these (case-insensitive) are kept when a code
/// block is shortened.
pub const DEFAULT_CONTEXT_HINTS: &[&str] = &["error", "exception", "traceback", "panic", "failed"];

/// Lines of context kept around each interesting code line.
const CODE_CONTEXT: usize = 3;

/// Longest parameter value shown in an approval prompt.
const PROMPT_VALUE_MAX: usize = 100;

/// Escape text for safe inclusion in Telegram HTML.
///
/// Escapes `&`, `<`, `>`, `"`, and `'` so the output is safe in both text
/// content and HTML attributes (e.g. `href="..."`).
#[must_use]
pub fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Regions already converted to HTML, swapped out for inert placeholders
/// while the inline transforms run.
#[derive(Default)]
struct Protected(Vec<String>);

impl Protected {
    fn stash(&mut self, html: String) -> String {
        let placeholder = format!("\x00P{}\x00", self.0.len());
        self.0.push(html);
        placeholder
    }

    fn restore(self, text: &str) -> String {
        let mut text = text.to_string();
        for (i, html) in self.0.iter().enumerate() {
            text = text.replace(&format!("\x00P{i}\x00"), html);
        }
        text
    }
}

/// Convert agent markdown to Telegram HTML.
///
/// Handles fenced code (with a language class when given), inline code,
/// bold, italic, strikethrough, links and headings. Everything else is
/// escaped. Links with schemes other than http, https, tg or mailto are
/// rendered as text.
#[must_use]
pub fn md_to_telegram_html(md: &str) -> String {
    static CODE_BLOCK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"```([\w+-]*)\n?([\s\S]*?)```").expect("invalid regex"));
    static INLINE_CODE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"`([^`\n]+)`").expect("invalid regex"));
    static BOLD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("invalid regex"));
    static ITALIC: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"([^*]|^)\*([^*\n]+)\*([^*]|$)").expect("invalid regex"));
    static STRIKE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"~~(.+?)~~").expect("invalid regex"));
    static LINK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("invalid regex"));
    static HEADING: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+(.+)$").expect("invalid regex"));

    let mut protected = Protected::default();

    let text = CODE_BLOCK.replace_all(md, |caps: &regex::Captures<'_>| {
        let code = html_escape(caps[2].trim_end_matches('\n'));
        let html = match &caps[1] {
            "" => format!("<pre>{code}</pre>"),
            lang => format!("<pre><code class=\"language-{lang}\">{code}</code></pre>"),
        };
        protected.stash(html)
    });
    let text = INLINE_CODE.replace_all(&text, |caps: &regex::Captures<'_>| {
        protected.stash(format!("<code>{}</code>", html_escape(&caps[1])))
    });

    // Placeholders contain nothing html_escape touches.
    let text = html_escape(&text);

    let text = BOLD.replace_all(&text, "<b>$1</b>");
    let text = ITALIC.replace_all(&text, "$1<i>$2</i>$3");
    let text = STRIKE.replace_all(&text, "<s>$1</s>");
    let text = LINK.replace_all(&text, |caps: &regex::Captures<'_>| {
        let (label, url) = (&caps[1], &caps[2]);
        // `url` is already escaped.
        if ["http://", "https://", "tg://", "mailto:"]
            .iter()
            .any(|scheme| url.starts_with(scheme))
        {
            format!("<a href=\"{url}\">{label}</a>")
        } else {
            format!("{label} ({url})")
        }
    });
    let text = HEADING.replace_all(&text, "<b>$1</b>");

    protected.restore(&text)
}

/// Split HTML into messages of at most about `max_len` bytes.
///
/// Splits at a newline or space where possible and never inside a tag or
/// entity. Every chunk is balanced on its own, and tags open at a split are
/// re-opened at the start of the next chunk, so a long `<pre>` block stays
/// formatted across messages. A `max_len` of zero means the Telegram limit.
#[must_use]
pub fn chunk_html(html: &str, max_len: usize) -> Vec<String> {
    let max_len = if max_len == 0 {
        MAX_MESSAGE_LEN
    } else {
        max_len
    };

    if html.len() <= max_len {
        return vec![html.to_string()];
    }

    let split_limit = max_len.saturating_sub(CLOSING_TAG_HEADROOM).max(1);
    let mut chunks = Vec::new();
    let mut carried = String::new();
    let mut remaining = html;

    while !remaining.is_empty() {
        if carried.len().saturating_add(remaining.len()) <= max_len {
            chunks.push(balance(&format!("{carried}{remaining}")));
            break;
        }

        let room = split_limit.saturating_sub(carried.len());
        if room == 0 {
            // Re-opened tags alone fill the chunk; give up on carrying them.
            carried.clear();
            continue;
        }

        let mut split_at = safe_truncate_point(remaining, room);
        if split_at == 0 {
            split_at = leading_token_len(remaining);
        }

        let chunk = format!("{carried}{}", &remaining[..split_at]);
        carried = reopening_tags(&chunk);
        chunks.push(balance(&chunk));

        let rest = &remaining[split_at..];
        remaining = rest
            .strip_prefix('\n')
            .or_else(|| rest.strip_prefix(' '))
            .unwrap_or(rest);

        // Only closers left: the previous chunk already closed them.
        if strip_markup(remaining).trim().is_empty() {
            break;
        }
    }

    chunks
}

/// Length of the tag, entity or character at the start of `text`.
fn leading_token_len(text: &str) -> usize {
    let end = match text.as_bytes().first() {
        Some(b'<') => text.find('>'),
        Some(b'&') => text.find(';'),
        _ => None,
    };
    end.map_or_else(|| text.ceil_char_boundary(1), |i| i.saturating_add(1))
}

/// Flatten newlines and shorten to `max_chars`, ending with `...` when cut.
fn shorten(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let mut out: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// First of `keys` present in `input`, rendered for display.
fn first_param(input: &ToolInput, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| input.get(k))
        .map(ToolInput::display_value)
}

/// The one argument worth showing next to a tool's name.
fn primary_argument(tool_name: &str, input: &ToolInput) -> String {
    let param = |keys: &[&str]| first_param(input, keys).unwrap_or_default();

    match tool_name.to_lowercase().as_str() {
        "read" | "write" | "edit" => shorten(&param(&["file_path", "path"]), 80),
        "bash" => shorten(&param(&["command"]), 100),
        "grep" => {
            let pattern = param(&["pattern"]);
            match input.get_str("path") {
                Some(path) if !path.is_empty() && path != "." => {
                    shorten(&format!("\"{pattern}\" --path={path}"), 80)
                },
                _ => shorten(&format!("\"{pattern}\""), 60),
            }
        },
        "glob" => shorten(&format!("\"{}\"", param(&["pattern"])), 60),
        "task" => shorten(&param(&["description", "prompt"]), 60),
        "webfetch" => shorten(&param(&["url"]), 80),
        "websearch" => shorten(&param(&["query"]), 60),
        "todowrite" => String::new(),
        _ => {
            if let Some(value) = first_param(
                input,
                &["file_path", "path", "command", "query", "pattern", "description"],
            ) {
                return shorten(&value, 60);
            }
            input
                .iter()
                .next()
                .map(|(_, v)| ToolInput::display_value(v))
                .filter(|v| v.chars().count() <= 40)
                .map(|v| shorten(&v, 40))
                .unwrap_or_default()
        },
    }
}

/// One line announcing a tool call, e.g. `> Bash ls -la`.
#[must_use]
pub fn format_tool_call(tool_name: &str, input: &ToolInput) -> String {
    let arg = primary_argument(tool_name, input);
    if arg.is_empty() {
        format!("\n<code>&gt; {}</code>\n", html_escape(tool_name))
    } else {
        format!(
            "\n<code>&gt; {}</code> <code>{}</code>\n",
            html_escape(tool_name),
            html_escape(&arg)
        )
    }
}

/// A tool's output as a `<pre>` block.
///
/// Output past [`MAX_RESULT_LEN`] bytes is cut at the last full line (when
/// that keeps at least half) and followed by `... (N more lines)`. Empty
/// output renders as nothing.
#[must_use]
pub fn format_tool_result(content: &str, is_error: bool) -> String {
    let text = content.trim();
    if text.is_empty() {
        return String::new();
    }

    let mut body = text.to_string();
    if text.len() > MAX_RESULT_LEN {
        let mut kept = truncate_to_boundary(text, MAX_RESULT_LEN);
        if let Some(nl) = kept.rfind('\n')
            && nl > MAX_RESULT_LEN / 2
        {
            kept = &kept[..nl];
        }
        let more = text
            .split('\n')
            .count()
            .saturating_sub(kept.matches('\n').count())
            .saturating_sub(1);
        body = format!("{kept}\n... ({more} more lines)");
    }

    let prefix = if is_error { "❌ " } else { "" };
    format!("\n<pre>{prefix}{}</pre>\n", html_escape(&body))
}

/// Source or log text as a `<pre>` block, shortened around the lines that
/// matter.
///
/// Up to [`MAX_CODE_LINES`] lines are shown as-is. Longer input keeps the
/// lines containing any of `context_hints` (case-insensitive, defaulting to
/// [`DEFAULT_CONTEXT_HINTS`]) with a few lines of context, or its head and
/// tail when nothing matches.
#[must_use]
pub fn format_code_block(code: &str, context_hints: Option<&[&str]>) -> String {
    let lines: Vec<&str> = code.lines().collect();
    if lines.len() <= MAX_CODE_LINES {
        return format!("<pre>{}</pre>", html_escape(code));
    }

    let hints: Vec<String> = context_hints
        .unwrap_or(DEFAULT_CONTEXT_HINTS)
        .iter()
        .filter(|h| !h.is_empty())
        .map(|h| h.to_lowercase())
        .collect();
    let interesting: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.to_lowercase();
            hints.iter().any(|h| line.contains(h.as_str()))
        })
        .map(|(i, _)| i)
        .collect();

    let body = truncate_lines(&lines, MAX_CODE_LINES, &interesting, CODE_CONTEXT);
    format!("<pre>{}</pre>", html_escape(&body))
}

/// Body of an approval prompt message.
#[must_use]
pub fn format_permission_prompt(tool_name: &str, input: &ToolInput) -> String {
    let mut params = String::new();
    for (key, value) in input.iter() {
        let value = ToolInput::display_value(value);
        let shown = if value.chars().count() > PROMPT_VALUE_MAX {
            let mut cut: String = value.chars().take(PROMPT_VALUE_MAX).collect();
            cut.push_str("...");
            cut
        } else {
            value
        };
        let _ = writeln!(
            params,
            "  <code>{}</code>: {}",
            html_escape(key),
            html_escape(&shown)
        );
    }
    if params.is_empty() {
        params.push_str("  (no parameters)\n");
    }

    format!(
        "🔐 <b>Permission Request</b>\n\n\
         Tool: <code>{}</code>\n\
         Input:\n{params}\n\
         Allow this tool to execute?",
        html_escape(tool_name)
    )
}
