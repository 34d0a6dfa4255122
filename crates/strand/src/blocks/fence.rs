//! Fenced code markers, following CommonMark's rules for fence lines.

/// An open code fence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fence {
    /// '`' or '~'.
    pub marker: char,
    /// Length of the opening marker run (at least 3).
    pub len: usize,
    /// Info string after the marker, trimmed. Its first word is the language.
    pub info: String,
}

impl Fence {
    /// Parse a fence opener. `line` may include its trailing newline.
    pub fn parse_open(line: &str) -> Option<Self> {
        let body = strip_indent(line)?;
        let marker = body.chars().next().filter(|c| *c == '`' || *c == '~')?;
        let len = body.chars().take_while(|c| *c == marker).count();
        if len < 3 {
            return None;
        }
        let info = body[len..].trim();
        // Backtick fences cannot carry backticks in their info string.
        if marker == '`' && info.contains('`') {
            return None;
        }
        Some(Self {
            marker,
            len,
            info: info.to_string(),
        })
    }

    /// Whether `line` closes this fence.
    pub fn is_close(&self, line: &str) -> bool {
        let Some(body) = strip_indent(line) else {
            return false;
        };
        let run = body.chars().take_while(|c| *c == self.marker).count();
        run >= self.len && body[run * self.marker.len_utf8()..].trim().is_empty()
    }

    /// Language named by the info string, if any.
    pub fn language(&self) -> Option<&str> {
        self.info.split_whitespace().next()
    }
}

/// Up to three leading spaces are allowed before a fence marker.
fn strip_indent(line: &str) -> Option<&str> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    (indent <= 3).then(|| &line[indent..])
}

/// Whether an incomplete line could still turn into a structural boundary
/// (a blank line or a fence marker) once it completes.
pub fn may_become_boundary(partial: &str) -> bool {
    let trimmed = partial.trim_start();
    trimmed.is_empty() || trimmed.starts_with('`') || trimmed.starts_with('~')
}

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}
