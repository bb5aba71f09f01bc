//! Content Processor
//!
//! Rich-text sanitization for policy content, plain-text statistics, and the
//! field-level validators shared by every domain (file names, MIME types,
//! tags, checksums, bounded text).

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::{GrcError, Result};

// =============================================================================
// LIMITS
// =============================================================================

pub const TITLE_MAX_CHARS: usize = 255;
pub const DESCRIPTION_MAX_CHARS: usize = 10_000;
pub const NOTES_MAX_CHARS: usize = 5_000;
pub const COMMENT_BODY_MAX_CHARS: usize = 10_000;
pub const EVALUATION_COMMENTS_MAX_CHARS: usize = 5_000;
pub const MISSING_ELEMENTS_MAX: usize = 20;
pub const MISSING_ELEMENT_MAX_CHARS: usize = 200;
pub const MAX_TAGS: usize = 20;
pub const TAG_MAX_CHARS: usize = 50;
pub const FILE_NAME_MAX_BYTES: usize = 255;
pub const SUMMARY_MAX_CHARS: usize = 500;

// =============================================================================
// HTML SANITIZATION
// =============================================================================

const ALLOWED_TAGS: &[&str] = &[
    "p", "br", "hr", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "a", "strong", "b",
    "em", "i", "u", "s", "blockquote", "code", "pre", "span", "div", "table", "thead", "tbody",
    "tfoot", "tr", "th", "td", "caption", "colgroup", "col", "sup", "sub", "img",
];

const ALLOWED_ATTRIBUTES: &[&str] = &[
    "class", "id", "style", "href", "title", "target", "rel", "colspan", "rowspan", "align",
    "src", "alt", "width", "height",
];

/// Dropped together with everything between their open and close tags.
const STRIPPED_BLOCKS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "form", "noscript", "template",
];

const DANGEROUS_CSS: &[&str] = &[
    "expression(",
    "javascript:",
    "url(",
    "behavior",
    "-moz-binding",
    "@import",
];

const SAFE_URL_SCHEMES: &[&str] = &["http", "https", "mailto"];

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?(-->|$)").expect("comment regex"));

/// One (closed block, unclosed tail) pair per stripped element. The regex
/// crate has no backreferences, so each element gets its own patterns.
static BLOCK_RES: LazyLock<Vec<(Regex, Regex)>> = LazyLock::new(|| {
    STRIPPED_BLOCKS
        .iter()
        .map(|tag| {
            let closed = Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
                .expect("block regex");
            let unclosed = Regex::new(&format!(r"(?is)<{tag}\b.*$")).expect("tail regex");
            (closed, unclosed)
        })
        .collect()
});

/// A tag, or a bare `<` that does not start one.
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(/?)([a-zA-Z][a-zA-Z0-9]*)((?:[^>"']|"[^"]*"|'[^']*')*)>|<"#)
        .expect("tag regex")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute regex")
});

static ANY_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("any-tag regex"));

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));

static CHECKSUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{64}$").expect("checksum regex"));

fn remove_blocks(input: &str) -> String {
    let mut out = COMMENT_RE.replace_all(input, "").into_owned();
    for (closed, unclosed) in BLOCK_RES.iter() {
        out = closed.replace_all(&out, "").into_owned();
        out = unclosed.replace_all(&out, "").into_owned();
    }
    out
}

fn is_safe_url(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    let scheme_end = compact.find(':');
    let path_start = compact.find(['/', '?', '#']);
    match (scheme_end, path_start) {
        (Some(colon), Some(path)) if path < colon => true,
        (Some(colon), _) => SAFE_URL_SCHEMES.contains(&&compact[..colon]),
        (None, _) => true,
    }
}

fn is_safe_style(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
        .replace("/*", "")
        .replace("*/", "")
        .replace('\\', "");
    !DANGEROUS_CSS.iter().any(|needle| compact.contains(needle))
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn rebuild_attributes(raw: &str) -> String {
    let mut out = String::new();
    let mut seen = HashSet::new();
    for caps in ATTR_RE.captures_iter(raw) {
        let name = caps[1].to_ascii_lowercase();
        if name.starts_with("on") || !ALLOWED_ATTRIBUTES.contains(&name.as_str()) {
            continue;
        }
        if !seen.insert(name.clone()) {
            continue;
        }
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str())
            .unwrap_or("");
        let keep = match name.as_str() {
            "href" | "src" => is_safe_url(value),
            "style" => is_safe_style(value),
            _ => true,
        };
        if keep {
            out.push_str(&format!(" {name}=\"{}\"", escape_attr(value)));
        }
    }
    out
}

/// Reduces HTML to the formatting allow-list.
///
/// Scriptable elements are removed with their content; every other tag
/// outside the allow-list is dropped but its text kept. Surviving tags keep
/// only allow-listed attributes with safe values.
pub fn sanitize_html(input: &str) -> String {
    let stripped = remove_blocks(input);
    TAG_RE
        .replace_all(&stripped, |caps: &Captures| {
            let Some(name) = caps.get(2) else {
                return "&lt;".to_string();
            };
            let name = name.as_str().to_ascii_lowercase();
            if !ALLOWED_TAGS.contains(&name.as_str()) {
                return String::new();
            }
            if !caps[1].is_empty() {
                return format!("</{name}>");
            }
            let raw_attrs = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            let self_closing = raw_attrs.trim_end().ends_with('/');
            let attrs = rebuild_attributes(raw_attrs.trim_end().trim_end_matches('/'));
            if self_closing {
                format!("<{name}{attrs} />")
            } else {
                format!("<{name}{attrs}>")
            }
        })
        .into_owned()
}

// =============================================================================
// TEXT STATISTICS
// =============================================================================

/// Visible text with whitespace runs collapsed.
pub fn strip_tags(input: &str) -> String {
    let without_blocks = remove_blocks(input);
    let text = ANY_TAG_RE.replace_all(&without_blocks, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&");
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}

pub fn word_count(input: &str) -> usize {
    strip_tags(input).split_whitespace().count()
}

pub fn character_count(input: &str) -> usize {
    strip_tags(input).chars().count()
}

/// Plain-text prefix of at most `max_chars`, cut at a word boundary.
pub fn summarize(input: &str, max_chars: usize) -> String {
    let text = strip_tags(input);
    if text.chars().count() <= max_chars {
        return text;
    }
    let cut: String = text.chars().take(max_chars).collect();
    let trimmed = match cut.rfind(' ') {
        Some(idx) if idx > 0 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}...", trimmed.trim_end())
}

// =============================================================================
// FIELD VALIDATORS
// =============================================================================

/// Replaces path separators and NUL, trims, and caps the name at 255 bytes
/// without splitting a character.
pub fn sanitize_file_name(raw: &str) -> Result<String> {
    let replaced: String = raw
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        return Err(GrcError::validation("file_name must not be empty"));
    }
    let mut end = trimmed.len().min(FILE_NAME_MAX_BYTES);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    Ok(trimmed[..end].to_string())
}

const ALLOWED_MIME_TYPES: &[&str] = &[
    // documents
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.oasis.opendocument.spreadsheet",
    "application/vnd.oasis.opendocument.presentation",
    "application/rtf",
    // images
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "image/tiff",
    "image/bmp",
    // text and structured data
    "text/plain",
    "text/csv",
    "text/markdown",
    "text/xml",
    "application/json",
    "application/xml",
    "application/x-yaml",
    "text/yaml",
    "message/rfc822",
    // archives
    "application/zip",
    "application/gzip",
    "application/x-tar",
    "application/x-7z-compressed",
];

/// Normalizes (lowercase, parameters dropped) and checks the allow-list.
pub fn validate_mime_type(raw: &str) -> Result<String> {
    let essence = raw
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if ALLOWED_MIME_TYPES.contains(&essence.as_str()) {
        Ok(essence)
    } else {
        Err(GrcError::validation(format!(
            "mime_type '{essence}' is not allowed"
        )))
    }
}

/// Trims, drops duplicates (first occurrence wins) and enforces the caps.
pub fn validate_tags(tags: &[String], max_count: usize, max_chars: usize) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(GrcError::validation("tags must not be empty"));
        }
        if tag.chars().count() > max_chars {
            return Err(GrcError::validation(format!(
                "tag '{tag}' exceeds {max_chars} characters"
            )));
        }
        if !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    if out.len() > max_count {
        return Err(GrcError::validation(format!(
            "at most {max_count} tags allowed"
        )));
    }
    Ok(out)
}

/// SHA-256 hex digest, stored lowercase.
pub fn validate_checksum(raw: &str) -> Result<String> {
    if CHECKSUM_RE.is_match(raw) {
        Ok(raw.to_ascii_lowercase())
    } else {
        Err(GrcError::validation(
            "checksum_sha256 must be 64 hexadecimal characters",
        ))
    }
}

/// Required, trimmed, bounded text.
pub fn require_text(field: &str, value: &str, max_chars: usize) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(GrcError::validation(format!("{field} is required")));
    }
    bounded(field, value, max_chars)
}

/// Optional text; blank collapses to `None`.
pub fn optional_text(field: &str, value: Option<&str>, max_chars: usize) -> Result<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => bounded(field, v, max_chars).map(Some),
    }
}

fn bounded(field: &str, value: &str, max_chars: usize) -> Result<String> {
    if value.chars().count() > max_chars {
        return Err(GrcError::validation(format!(
            "{field} exceeds {max_chars} characters"
        )));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_formatting() {
        let html = r#"<h1 class="title">Access</h1><p>Use <strong>MFA</strong> <a href="https://x.test/a" target="_blank">here</a>.</p><table><tr><td colspan="2">x</td></tr></table>"#;
        let clean = sanitize_html(html);
        assert_eq!(
            clean,
            r#"<h1 class="title">Access</h1><p>Use <strong>MFA</strong> <a href="https://x.test/a" target="_blank">here</a>.</p><table><tr><td colspan="2">x</td></tr></table>"#
        );
    }

    #[test]
    fn removes_scripts_with_content() {
        let clean = sanitize_html("<p>a</p><script>alert(1)</script><p>b</p>");
        assert_eq!(clean, "<p>a</p><p>b</p>");
        let unclosed = sanitize_html("<p>a</p><SCRIPT src=x>alert(1)");
        assert_eq!(unclosed, "<p>a</p>");
        let iframe = sanitize_html("x<iframe src=\"https://evil\"></iframe>y");
        assert_eq!(iframe, "xy");
    }

    #[test]
    fn drops_event_handlers_and_js_urls() {
        let clean = sanitize_html(r#"<img src="javascript:alert(1)" onerror="alert(1)" alt="a">"#);
        assert_eq!(clean, r#"<img alt="a">"#);
        let link = sanitize_html(r#"<a href=" JaVaScRiPt:alert(1)">x</a>"#);
        assert_eq!(link, "<a>x</a>");
        let relative = sanitize_html(r##"<a href="/docs?x=a:b">x</a><a href="#top">t</a>"##);
        assert_eq!(relative, r##"<a href="/docs?x=a:b">x</a><a href="#top">t</a>"##);
    }

    #[test]
    fn drops_dangerous_css() {
        let clean = sanitize_html(r#"<p style="width: expression(alert(1))">x</p>"#);
        assert_eq!(clean, "<p>x</p>");
        let bg = sanitize_html(r#"<div style="background:url(http://x)">x</div>"#);
        assert_eq!(bg, "<div>x</div>");
        let ok = sanitize_html(r#"<span style="color: red">x</span>"#);
        assert_eq!(ok, r#"<span style="color: red">x</span>"#);
    }

    #[test]
    fn unknown_tags_keep_text_and_bare_angles_escape() {
        assert_eq!(sanitize_html("<blink>hi</blink>"), "hi");
        assert_eq!(sanitize_html("a < b <!-- c -->"), "a &lt; b ");
        assert_eq!(sanitize_html("<br/>"), "<br />");
    }

    #[test]
    fn counts_visible_words() {
        let html = "<p>The  quick</p>\n<p>brown <em>fox</em></p><script>var a = 1;</script>";
        assert_eq!(word_count(html), 4);
        assert_eq!(strip_tags(html), "The quick brown fox");
        assert_eq!(character_count(html), "The quick brown fox".len());
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn summary_cuts_on_word_boundary() {
        assert_eq!(summarize("short text", 500), "short text");
        assert_eq!(summarize("alpha beta gamma", 12), "alpha beta...");
    }

    #[test]
    fn file_names_are_flattened_and_capped() {
        assert_eq!(sanitize_file_name("../etc/passwd").unwrap(), ".._etc_passwd");
        assert_eq!(sanitize_file_name("a\\b\0c").unwrap(), "a_b_c");
        assert!(sanitize_file_name("   ").is_err());

        let long = "é".repeat(200);
        let capped = sanitize_file_name(&long).unwrap();
        assert!(capped.len() <= FILE_NAME_MAX_BYTES);
        assert_eq!(capped.len(), 254);
    }

    #[test]
    fn mime_allow_list_rejects_executables() {
        assert_eq!(
            validate_mime_type("Application/PDF; charset=binary").unwrap(),
            "application/pdf"
        );
        assert!(validate_mime_type("application/x-msdownload").is_err());
        assert!(validate_mime_type("application/x-sh").is_err());
        assert!(validate_mime_type("text/html").is_err());
    }

    #[test]
    fn tag_limits() {
        let ok: Vec<String> = (0..20).map(|i| format!("t{i}")).collect();
        assert_eq!(validate_tags(&ok, MAX_TAGS, TAG_MAX_CHARS).unwrap().len(), 20);

        let too_many: Vec<String> = (0..21).map(|i| format!("t{i}")).collect();
        assert!(validate_tags(&too_many, MAX_TAGS, TAG_MAX_CHARS).is_err());

        let too_long = vec!["x".repeat(51)];
        assert!(validate_tags(&too_long, MAX_TAGS, TAG_MAX_CHARS).is_err());

        let dupes = vec!["soc2".to_string(), " soc2 ".to_string()];
        assert_eq!(validate_tags(&dupes, MAX_TAGS, TAG_MAX_CHARS).unwrap(), vec!["soc2"]);
    }

    #[test]
    fn checksum_is_lowercased() {
        let upper = "A".repeat(64);
        assert_eq!(validate_checksum(&upper).unwrap(), "a".repeat(64));
        assert!(validate_checksum(&"a".repeat(63)).is_err());
        assert!(validate_checksum(&"g".repeat(64)).is_err());
    }

    #[test]
    fn text_helpers() {
        assert_eq!(require_text("title", "  x ", 5).unwrap(), "x");
        assert!(require_text("title", "   ", 5).is_err());
        assert!(require_text("title", "123456", 5).is_err());
        assert_eq!(optional_text("d", Some(" "), 5).unwrap(), None);
    }
}
