//! Markdown to HTML conversion.
//!
//! A deliberately small dialect: headings, bold, italic, inline code, fenced
//! code blocks, links, `- ` lists, and paragraphs. Anything else passes
//! through as paragraph text.
//!
//! ## Pipeline
//!
//! ```text
//! 1. Tokenize   lines   →  blocks     (fences, headings, list items, text, blanks)
//! 2. Inline     blocks  →  html spans (code spans extracted to placeholders first)
//! 3. Assemble   blocks  →  output     (adjacent list items share one <ul>)
//! ```
//!
//! Fenced code and inline code are lifted out before any inline pass runs, so
//! `*` or `[` inside code can never be reinterpreted as emphasis or links.
//! Heading text is emitted exactly as written.
//! Output is a pure function of the input: no shared state, safe to call from
//! any number of threads at once.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("static regex"));
static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-\s+(.+)$").expect("static regex"));
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("static regex"));
static BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("static regex"));
static ITALIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*(.+?)\*").expect("static regex"));
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(.+?)\]\((.+?)\)").expect("static regex"));
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\x1A([0-9]+)\x1A").expect("static regex"));

const FENCE: &str = "```";

/// One line-level unit of the document.
#[derive(Debug, Clone, PartialEq)]
enum Block {
    Code { lang: Option<String>, body: Vec<String> },
    Heading { level: usize, text: String },
    ListItem(String),
    Text(String),
    Blank,
}

/// Convert markdown text to an HTML fragment.
///
/// Empty input yields empty output. Whitespace-only lines are kept as empty
/// lines and never become paragraphs.
pub fn to_html(markdown: &str) -> String {
    if markdown.is_empty() {
        return String::new();
    }

    let blocks = tokenize(markdown);
    let mut out: Vec<String> = Vec::with_capacity(blocks.len());
    let mut list: Vec<String> = Vec::new();

    for block in blocks {
        if !matches!(block, Block::ListItem(_)) {
            flush_list(&mut list, &mut out);
        }

        match block {
            Block::ListItem(text) => list.push(format!("<li>{}</li>", render_inline(&text))),
            Block::Code { lang, body } => out.push(render_code_block(lang.as_deref(), &body)),
            // Heading text is emitted as written; no inline pass touches it
            Block::Heading { level, text } => out.push(format!("<h{level}>{text}</h{level}>")),
            Block::Text(text) => {
                let html = render_inline(&text);
                if html.starts_with('<') {
                    out.push(html);
                } else {
                    out.push(format!("<p>{html}</p>"));
                }
            }
            Block::Blank => out.push(String::new()),
        }
    }
    flush_list(&mut list, &mut out);

    out.join("\n").replace("<p></p>", "")
}

/// Byte-oriented wrapper around [`to_html`]. Invalid UTF-8 is replaced lossily.
pub fn to_html_bytes(markdown: &[u8]) -> Vec<u8> {
    to_html(&String::from_utf8_lossy(markdown)).into_bytes()
}

fn flush_list(list: &mut Vec<String>, out: &mut Vec<String>) {
    if list.is_empty() {
        return;
    }
    let mut html = String::from("<ul>\n");
    for item in list.drain(..) {
        html.push_str(&item);
        html.push('\n');
    }
    html.push_str("</ul>");
    out.push(html);
}

/// Split the document into blocks. Fences are matched first so their
/// contents are never classified as headings or list items.
fn tokenize(markdown: &str) -> Vec<Block> {
    let lines: Vec<&str> = markdown
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if let Some(info) = line.trim_start().strip_prefix(FENCE)
            && let Some(close) = find_closing_fence(&lines, i + 1)
        {
            let lang = info.trim();
            blocks.push(Block::Code {
                lang: (!lang.is_empty()).then(|| lang.to_string()),
                body: lines[i + 1..close].iter().map(|l| l.to_string()).collect(),
            });
            i = close + 1;
            continue;
        }

        if line.trim().is_empty() {
            blocks.push(Block::Blank);
        } else if let Some(caps) = HEADING.captures(line) {
            blocks.push(Block::Heading {
                level: caps[1].len(),
                text: caps[2].trim().to_string(),
            });
        } else if let Some(caps) = LIST_ITEM.captures(line) {
            blocks.push(Block::ListItem(caps[1].trim_end().to_string()));
        } else {
            blocks.push(Block::Text(line.trim().to_string()));
        }
        i += 1;
    }

    blocks
}

fn find_closing_fence(lines: &[&str], from: usize) -> Option<usize> {
    (from..lines.len()).find(|&j| lines[j].trim() == FENCE)
}

fn render_code_block(lang: Option<&str>, body: &[String]) -> String {
    let open = match lang {
        Some(lang) => format!("<pre><code class=\"language-{}\">", escape_html(lang)),
        None => "<pre><code>".to_string(),
    };
    let mut html = open;
    html.push('\n');
    for line in body {
        html.push_str(&escape_html(line));
        html.push('\n');
    }
    html.push_str("</code></pre>");
    html
}

/// Inline passes over a single line of text.
///
/// Code spans are swapped for `\x1A<n>\x1A` placeholders before emphasis and
/// links run, then restored last.
fn render_inline(text: &str) -> String {
    let mut spans: Vec<String> = Vec::new();
    let protected = INLINE_CODE.replace_all(text, |caps: &Captures| {
        spans.push(format!("<code>{}</code>", escape_html(&caps[1])));
        format!("\x1A{}\x1A", spans.len() - 1)
    });

    let html = BOLD.replace_all(&protected, "<strong>$1</strong>");
    let html = ITALIC.replace_all(&html, "<em>$1</em>");
    let html = LINK.replace_all(&html, "<a href=\"$2\">$1</a>");

    PLACEHOLDER
        .replace_all(&html, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|n| spans.get(n).cloned())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
