//! Single-pass prompt template rendering.
//!
//! Syntax: `{name}` is a placeholder when `name` is made of ASCII letters, digits and
//! underscores. `{{` and `}}` render as literal braces. Any other brace is literal text,
//! which keeps JSON examples inside templates readable.
//!
//! Substituted values are copied into the output verbatim and are never scanned again,
//! so resume text containing `{question}` or unbalanced braces renders as-is.

use crate::prompt::PromptBuildError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(c) = rest.chars().next() {
            if let Some(after) = rest.strip_prefix("{{") {
                literal.push('{');
                rest = after;
                continue;
            }
            if let Some(after) = rest.strip_prefix("}}") {
                literal.push('}');
                rest = after;
                continue;
            }
            if c == '{' {
                if let Some((name, after)) = placeholder_at(rest) {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name.to_string()));
                    rest = after;
                    continue;
                }
            }
            literal.push(c);
            rest = &rest[c.len_utf8()..];
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Self { segments }
    }

    /// Fills every placeholder from `values`. Extra values are ignored.
    pub fn render(&self, values: &[(&str, &str)]) -> Result<String, PromptBuildError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = values
                        .iter()
                        .find(|(key, _)| key == name)
                        .map(|(_, value)| *value)
                        .ok_or_else(|| PromptBuildError::MissingValue(name.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

/// If `s` starts with `{ident}`, returns the identifier and the text after the brace.
fn placeholder_at(s: &str) -> Option<(&str, &str)> {
    let body = s.strip_prefix('{')?;
    let end = body.find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))?;
    if end == 0 || !body[end..].starts_with('}') {
        return None;
    }
    Some((&body[..end], &body[end + 1..]))
}
