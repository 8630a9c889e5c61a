//! Front matter: the `---` delimited metadata block at the top of a content file.
//!
//! ## Dialect
//!
//! A deliberately small subset of YAML, one key per line:
//!
//! ```text
//! ---
//! title: Hello World          # strings, optionally quoted
//! date: 2024-01-01T00:00:00Z  # RFC 3339 or YYYY-MM-DD
//! draft: false                # booleans
//! weight: 3                   # integers and floats
//! tags: [rust, web]           # inline list
//! aliases:                    # block list
//!   - /old-url
//!   - /older-url
//! ---
//! ```
//!
//! Unknown keys are parsed and ignored. Recognized keys are `title`,
//! `description`, `date`, `tags`, `draft`, `layout` and `slug`.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

const DELIMITER: &str = "---";

#[derive(Error, Debug, PartialEq)]
pub enum FrontMatterError {
    #[error("no front matter found")]
    Missing,
    #[error("front matter is not closed with '---'")]
    Unterminated,
    #[error("invalid value for '{key}': {reason}")]
    InvalidField { key: String, reason: String },
}

/// A decoded scalar or list value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<String>),
}

impl Value {
    /// Render any scalar as text. Lists have no text form.
    fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(n) => Some(n.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::List(_) => None,
        }
    }
}

/// Descriptive fields recognized in a content file's front matter.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontMatter {
    pub title: String,
    pub description: String,
    pub date: DateTime<Utc>,
    pub tags: Vec<String>,
    pub draft: bool,
    pub layout: Option<String>,
    pub slug: Option<String>,
}

impl Default for FrontMatter {
    fn default() -> Self {
        Self {
            title: String::new(),
            description: String::new(),
            date: DateTime::UNIX_EPOCH,
            tags: Vec::new(),
            draft: false,
            layout: None,
            slug: None,
        }
    }
}

impl FrontMatter {
    /// Build the recognized fields from a decoded key/value map.
    pub fn from_fields(fields: &BTreeMap<String, Value>) -> Result<Self, FrontMatterError> {
        let mut fm = FrontMatter::default();

        if let Some(v) = fields.get("title") {
            fm.title = text_field("title", v)?;
        }
        if let Some(v) = fields.get("description") {
            fm.description = text_field("description", v)?;
        }
        if let Some(v) = fields.get("date") {
            fm.date = date_field(v)?;
        }
        if let Some(v) = fields.get("tags") {
            fm.tags = match v {
                Value::List(items) => items.clone(),
                Value::Null => Vec::new(),
                // A bare scalar is treated as a single tag
                other => vec![text_field("tags", other)?],
            };
        }
        if let Some(v) = fields.get("draft") {
            fm.draft = match v {
                Value::Bool(b) => *b,
                Value::Null => false,
                other => {
                    return Err(FrontMatterError::InvalidField {
                        key: "draft".into(),
                        reason: format!("expected true or false, got {other:?}"),
                    });
                }
            };
        }
        if let Some(v) = fields.get("layout") {
            fm.layout = Some(text_field("layout", v)?).filter(|s| !s.is_empty());
        }
        if let Some(v) = fields.get("slug") {
            fm.slug = Some(text_field("slug", v)?).filter(|s| !s.is_empty());
        }

        Ok(fm)
    }

    /// Encode as a canonical front matter block, delimiters included.
    ///
    /// Decoding the result with [`split`] yields an equal `FrontMatter`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(DELIMITER);
        out.push('\n');
        out.push_str(&format!("title: {}\n", encode_scalar(&self.title)));
        if !self.description.is_empty() {
            out.push_str(&format!("description: {}\n", encode_scalar(&self.description)));
        }
        out.push_str(&format!(
            "date: {}\n",
            self.date.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        ));
        if !self.tags.is_empty() {
            out.push_str("tags:\n");
            for tag in &self.tags {
                out.push_str(&format!("  - {}\n", encode_scalar(tag)));
            }
        }
        out.push_str(&format!("draft: {}\n", self.draft));
        if let Some(layout) = &self.layout {
            out.push_str(&format!("layout: {}\n", encode_scalar(layout)));
        }
        if let Some(slug) = &self.slug {
            out.push_str(&format!("slug: {}\n", encode_scalar(slug)));
        }
        out.push_str(DELIMITER);
        out.push('\n');
        out
    }
}

/// Split a document into decoded front matter and the remaining body.
pub fn split(source: &str) -> Result<(FrontMatter, &str), FrontMatterError> {
    let (block, body) = extract_block(source)?;
    let fields = parse_fields(block);
    Ok((FrontMatter::from_fields(&fields)?, body))
}

/// Locate the delimited block. Returns `(block, body)`.
fn extract_block(source: &str) -> Result<(&str, &str), FrontMatterError> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let (first, rest) = split_line(source);
    if first.trim_end() != DELIMITER {
        return Err(FrontMatterError::Missing);
    }

    let mut offset = 0;
    let mut remaining = rest;
    while !remaining.is_empty() {
        let (line, after) = split_line(remaining);
        if line.trim_end() == DELIMITER {
            return Ok((&rest[..offset], after));
        }
        offset += remaining.len() - after.len();
        remaining = after;
    }
    Err(FrontMatterError::Unterminated)
}

/// Split off the first line (without its terminator) from the rest.
fn split_line(s: &str) -> (&str, &str) {
    match s.find('\n') {
        Some(i) => (s[..i].strip_suffix('\r').unwrap_or(&s[..i]), &s[i + 1..]),
        None => (s, ""),
    }
}

/// Decode the block's lines into a key/value map.
///
/// Lines that are neither `key: value` nor list items are skipped.
pub fn parse_fields(block: &str) -> BTreeMap<String, Value> {
    let mut fields = BTreeMap::new();
    let mut list_key: Option<String> = None;

    for raw in block.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(item) = list_item(line) {
            if let Some(key) = &list_key
                && let Some(Value::List(items)) = fields.get_mut(key)
            {
                items.push(item);
            }
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            list_key = None;
            continue;
        };
        let key = key.trim().to_string();
        let value = strip_comment(value.trim());

        if value.is_empty() {
            // Declaration of a block list; items follow on the next lines
            fields.insert(key.clone(), Value::List(Vec::new()));
            list_key = Some(key);
            continue;
        }

        if let Some(item) = list_item(value) {
            fields.insert(key.clone(), Value::List(vec![item]));
            list_key = Some(key);
            continue;
        }

        list_key = None;
        fields.insert(key, parse_scalar(value));
    }

    // An empty declaration with no items underneath is an empty value, not a list
    for value in fields.values_mut() {
        if matches!(value, Value::List(items) if items.is_empty()) {
            *value = Value::Null;
        }
    }

    fields
}

fn list_item(line: &str) -> Option<String> {
    let rest = line.strip_prefix('-')?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(unquote(rest.trim()).to_string())
}

/// Strip a trailing ` # comment` from an unquoted value.
fn strip_comment(value: &str) -> &str {
    if value.starts_with('"') || value.starts_with('\'') {
        return value;
    }
    match value.find(" #") {
        Some(i) => value[..i].trim_end(),
        None => value,
    }
}

fn parse_scalar(value: &str) -> Value {
    if let Some(inner) = value.strip_prefix('[').and_then(|v| v.strip_suffix(']')) {
        let inner = inner.trim();
        if inner.is_empty() {
            return Value::List(Vec::new());
        }
        return Value::List(
            inner
                .split(',')
                .map(|item| unquote(item.trim()).to_string())
                .collect(),
        );
    }

    match value {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" | "nil" | "~" => return Value::Null,
        _ => {}
    }

    if value.contains('.') {
        if let Ok(f) = value.parse::<f64>()
            && f.is_finite()
        {
            return Value::Float(f);
        }
    } else if let Ok(n) = value.parse::<i64>() {
        return Value::Int(n);
    }

    Value::String(unquote(value).to_string())
}

fn unquote(s: &str) -> &str {
    for quote in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Quote a string when leaving it bare would change how it decodes.
fn encode_scalar(s: &str) -> String {
    let plain = parse_scalar(s);
    let needs_quotes = s.is_empty()
        || s != s.trim()
        || s.contains(" #")
        || s.starts_with('#')
        || s.starts_with('-')
        || s.starts_with('[')
        || s.starts_with('"')
        || s.starts_with('\'')
        || plain != Value::String(s.to_string());
    if needs_quotes && !s.contains('"') {
        format!("\"{s}\"")
    } else if needs_quotes {
        format!("'{s}'")
    } else {
        s.to_string()
    }
}

fn text_field(key: &str, value: &Value) -> Result<String, FrontMatterError> {
    value.as_text().ok_or_else(|| FrontMatterError::InvalidField {
        key: key.to_string(),
        reason: "expected a single value, got a list".into(),
    })
}

fn date_field(value: &Value) -> Result<DateTime<Utc>, FrontMatterError> {
    let text = match value {
        Value::Null => return Ok(DateTime::UNIX_EPOCH),
        Value::String(s) => s.as_str(),
        other => {
            return Err(FrontMatterError::InvalidField {
                key: "date".into(),
                reason: format!("expected a timestamp, got {other:?}"),
            });
        }
    };
    parse_date(text).ok_or_else(|| FrontMatterError::InvalidField {
        key: "date".into(),
        reason: format!("'{text}' is neither RFC 3339 nor YYYY-MM-DD"),
    })
}

/// Parse an RFC 3339 timestamp, or a bare date at midnight UTC.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    // =========================================================================
    // Block extraction
    // =========================================================================

    #[test]
    fn missing_front_matter_is_error() {
        assert_eq!(split("# Just a body").unwrap_err(), FrontMatterError::Missing);
    }

    #[test]
    fn unterminated_front_matter_is_error() {
        assert_eq!(
            split("---\ntitle: x\n# body").unwrap_err(),
            FrontMatterError::Unterminated
        );
    }

    #[test]
    fn body_follows_closing_delimiter() {
        let (fm, body) = split("---\ntitle: Hello\n---\n# Hi\n").unwrap();
        assert_eq!(fm.title, "Hello");
        assert_eq!(body, "# Hi\n");
    }

    #[test]
    fn closing_delimiter_at_end_of_file() {
        let (fm, body) = split("---\ntitle: Hello\n---").unwrap();
        assert_eq!(fm.title, "Hello");
        assert_eq!(body, "");
    }

    #[test]
    fn crlf_delimiters() {
        let (fm, body) = split("---\r\ntitle: Hello\r\n---\r\nbody").unwrap();
        assert_eq!(fm.title, "Hello");
        assert_eq!(body, "body");
    }

    // =========================================================================
    // Field decoding
    // =========================================================================

    #[test]
    fn scalars_are_typed() {
        let fields = parse_fields("a: true\nb: 42\nc: 1.5\nd: hello\ne: null");
        assert_eq!(fields["a"], Value::Bool(true));
        assert_eq!(fields["b"], Value::Int(42));
        assert_eq!(fields["c"], Value::Float(1.5));
        assert_eq!(fields["d"], Value::String("hello".into()));
        assert_eq!(fields["e"], Value::Null);
    }

    #[test]
    fn block_list() {
        let fields = parse_fields("tags:\n  - test\n  - example\ndraft: false");
        assert_eq!(
            fields["tags"],
            Value::List(vec!["test".into(), "example".into()])
        );
        assert_eq!(fields["draft"], Value::Bool(false));
    }

    #[test]
    fn unindented_block_list() {
        let fields = parse_fields("tags:\n- a\n- b");
        assert_eq!(fields["tags"], Value::List(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn inline_list() {
        let fields = parse_fields("tags: [rust, \"web dev\", go]");
        assert_eq!(
            fields["tags"],
            Value::List(vec!["rust".into(), "web dev".into(), "go".into()])
        );
    }

    #[test]
    fn empty_inline_list() {
        let (fm, _) = split("---\ntags: []\n---\n").unwrap();
        assert!(fm.tags.is_empty());
    }

    #[test]
    fn single_item_inline_dash() {
        let fields = parse_fields("tags: - only");
        assert_eq!(fields["tags"], Value::List(vec!["only".into()]));
    }

    #[test]
    fn quotes_and_comments() {
        let fields = parse_fields("# comment\ntitle: \"Hello: World\"\nslug: hi # trailing");
        assert_eq!(fields["title"], Value::String("Hello: World".into()));
        assert_eq!(fields["slug"], Value::String("hi".into()));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let (fm, _) = split("---\ntitle: T\nweight: 3\nauthor: me\n---\n").unwrap();
        assert_eq!(fm.title, "T");
    }

    #[test]
    fn numeric_title_becomes_text() {
        let (fm, _) = split("---\ntitle: 2024\n---\n").unwrap();
        assert_eq!(fm.title, "2024");
    }

    #[test]
    fn rfc3339_and_plain_dates() {
        let (fm, _) = split("---\ndate: 2024-01-01T00:00:00Z\n---\n").unwrap();
        assert_eq!(fm.date, date(2024, 1, 1));
        let (fm, _) = split("---\ndate: 2024-03-05\n---\n").unwrap();
        assert_eq!(fm.date, date(2024, 3, 5));
    }

    #[test]
    fn invalid_date_is_error() {
        let err = split("---\ndate: yesterday\n---\n").unwrap_err();
        assert!(matches!(err, FrontMatterError::InvalidField { key, .. } if key == "date"));
    }

    #[test]
    fn non_boolean_draft_is_error() {
        let err = split("---\ndraft: maybe\n---\n").unwrap_err();
        assert!(matches!(err, FrontMatterError::InvalidField { key, .. } if key == "draft"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let (fm, _) = split("---\n---\nbody").unwrap();
        assert_eq!(fm, FrontMatter::default());
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    #[test]
    fn render_then_split_is_stable() {
        let cases = vec![
            FrontMatter {
                title: "Hello".into(),
                date: date(2024, 1, 1),
                ..Default::default()
            },
            FrontMatter {
                title: "Colons: and # hashes".into(),
                description: "true".into(),
                date: Utc.with_ymd_and_hms(2023, 6, 7, 8, 9, 10).unwrap(),
                tags: vec!["rust".into(), "42".into(), "web dev".into()],
                draft: true,
                layout: Some("wide".into()),
                slug: Some("custom-slug".into()),
            },
            FrontMatter {
                title: "- dash first".into(),
                description: "  padded  ".into(),
                tags: vec!["[bracket]".into()],
                ..Default::default()
            },
        ];

        for fm in cases {
            let block = fm.render();
            let (decoded, body) = split(&block).unwrap();
            assert_eq!(decoded, fm, "round trip failed for block:\n{block}");
            assert_eq!(body, "");
        }
    }

    #[test]
    fn render_omits_empty_optional_fields() {
        let fm = FrontMatter {
            title: "T".into(),
            ..Default::default()
        };
        let block = fm.render();
        assert!(!block.contains("description"));
        assert!(!block.contains("tags"));
        assert!(!block.contains("layout"));
        assert!(!block.contains("slug"));
        assert!(block.contains("draft: false"));
    }
}
