//! Template variable placeholders.
//!
//! `$var`, `[[var]]`, `[[var:fmt]]`, `${var}` and `${var:fmt}` are not valid
//! LogQL, so they are swapped for identifier-safe placeholders before parsing
//! and swapped back in every extracted substring.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::ops::Range;

static VARIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\$(\w+)|\[\[([\s\S]+?)(?::(\w+))?\]\]|\$\{(\w+)(?:\.([^:^\}]+))?(?::([^\}]+))?\}",
    )
    .expect("variable regex is valid")
});

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"__V_(\d)__(.+?)__V__(?:__F__(\w+)__F__)?").expect("placeholder regex is valid")
});

/// Text with variables replaced, plus the spans needed to map offsets back.
#[derive(Debug, Clone)]
pub struct Interpolated {
    /// Parser-safe text.
    pub text: String,
    spans: Vec<Substitution>,
}

#[derive(Debug, Clone)]
struct Substitution {
    replaced: Range<usize>,
    original: Range<usize>,
}

impl Interpolated {
    /// Maps a byte offset in [`Interpolated::text`] back to the source text.
    ///
    /// Offsets inside a placeholder map to the start of the variable.
    pub fn original_offset(&self, offset: usize) -> usize {
        let mut last: Option<&Substitution> = None;
        for span in &self.spans {
            if offset < span.replaced.start {
                break;
            }
            if offset < span.replaced.end {
                return span.original.start;
            }
            last = Some(span);
        }
        match last {
            Some(span) => offset - span.replaced.end + span.original.end,
            None => offset,
        }
    }
}

fn placeholder(caps: &Captures<'_>) -> String {
    let (var_type, variable, fmt) = if let Some(v) = caps.get(2) {
        ('1', v.as_str(), caps.get(3))
    } else if let Some(v) = caps.get(4) {
        ('2', v.as_str(), caps.get(6))
    } else {
        ('0', caps.get(1).map_or("", |m| m.as_str()), None)
    };

    let mut out = format!("__V_{var_type}__{variable}__V__");
    if let Some(fmt) = fmt.filter(|f| !f.as_str().is_empty()) {
        out.push_str("__F__");
        out.push_str(fmt.as_str());
        out.push_str("__F__");
    }
    out
}

/// Replaces every template variable with a placeholder.
///
/// A `${var.field}` field path is not carried through the placeholder.
pub fn replace_variables(expr: &str) -> String {
    VARIABLE
        .replace_all(expr, |caps: &Captures<'_>| placeholder(caps))
        .into_owned()
}

/// Like [`replace_variables`] but remembers where each substitution happened.
pub fn interpolate(expr: &str) -> Interpolated {
    let mut text = String::with_capacity(expr.len());
    let mut spans = Vec::new();
    let mut cursor = 0;

    for caps in VARIABLE.captures_iter(expr) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        text.push_str(&expr[cursor..whole.start()]);
        let start = text.len();
        text.push_str(&placeholder(&caps));
        spans.push(Substitution {
            replaced: start..text.len(),
            original: whole.range(),
        });
        cursor = whole.end();
    }
    text.push_str(&expr[cursor..]);

    Interpolated { text, spans }
}

/// Restores the original variable syntax in text containing placeholders.
pub fn return_variables(expr: &str) -> String {
    PLACEHOLDER
        .replace_all(expr, |caps: &Captures<'_>| {
            let variable = caps.get(2).map_or("", |m| m.as_str());
            let fmt = caps.get(3).map(|m| m.as_str());
            match (caps.get(1).map(|m| m.as_str()), fmt) {
                (Some("1"), Some(f)) => format!("[[{variable}:{f}]]"),
                (Some("1"), None) => format!("[[{variable}]]"),
                (Some("2"), Some(f)) => format!("${{{variable}:{f}}}"),
                (Some("2"), None) => format!("${{{variable}}}"),
                _ => format!("${variable}"),
            }
        })
        .into_owned()
}
