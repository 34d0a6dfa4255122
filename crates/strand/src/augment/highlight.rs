//! Syntax highlighting to inline-styled HTML.

use once_cell::sync::Lazy;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::{SyntaxReference, SyntaxSet};
use thiserror::Error;

// Loaded once; both sets are immutable afterwards.
static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

#[derive(Debug, Error)]
pub enum HighlightError {
    #[error("no syntax for language {0:?}")]
    UnknownLanguage(Option<String>),

    #[error("unknown theme: {0}")]
    UnknownTheme(String),

    #[error("highlighter failed: {0}")]
    Syntect(#[from] syntect::Error),
}

/// Whether `name` is one of the bundled themes.
pub fn has_theme(name: &str) -> bool {
    THEME_SET.themes.contains_key(name)
}

/// Cut `content` to at most `limit` bytes without splitting a character.
/// Returns the retained prefix and whether anything was cut.
pub fn truncate_at_char_boundary(content: &str, limit: usize) -> (&str, bool) {
    if content.len() <= limit {
        return (content, false);
    }
    let mut end = limit;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    (&content[..end], true)
}

fn find_syntax(language: Option<&str>, extension: Option<&str>) -> Option<&'static SyntaxReference> {
    extension
        .and_then(|ext| SYNTAX_SET.find_syntax_by_extension(ext))
        .or_else(|| language.and_then(|lang| SYNTAX_SET.find_syntax_by_token(lang)))
}

/// Highlight `content` with the syntax for `language` (or the file
/// `extension`).
pub fn highlight(
    content: &str,
    language: Option<&str>,
    extension: Option<&str>,
    theme: &str,
) -> Result<String, HighlightError> {
    let syntax = find_syntax(language, extension)
        .ok_or_else(|| HighlightError::UnknownLanguage(language.map(str::to_string)))?;
    let theme = THEME_SET
        .themes
        .get(theme)
        .ok_or_else(|| HighlightError::UnknownTheme(theme.to_string()))?;
    Ok(highlighted_html_for_string(content, &SYNTAX_SET, syntax, theme)?)
}

/// Highlight, or fall back to escaped `<pre>` markup.
pub fn render_code(
    content: &str,
    language: Option<&str>,
    extension: Option<&str>,
    theme: &str,
) -> String {
    match highlight(content, language, extension, theme) {
        Ok(html) => html,
        Err(HighlightError::UnknownLanguage(_)) => plain_pre(content),
        Err(e) => {
            tracing::warn!(error = %e, ?language, "highlighting failed, using plain markup");
            plain_pre(content)
        }
    }
}

/// Un-highlighted, escaped markup.
pub fn plain_pre(content: &str) -> String {
    format!("<pre class=\"plain\">{}</pre>", html_escape(content))
}

/// Escape HTML entities
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
