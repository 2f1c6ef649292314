//! Plain-text rendering of function documentation.
//!
//! Function docs are written with a small amount of reStructuredText markup
//! (directives, roles, inline literals). [`strip_rst`] turns them into text
//! suitable for a terminal.

use std::sync::LazyLock;

use regex::Regex;

static CODE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" *\.\. code-block:: *\S+\n{1,2}").expect("valid regex"));

static ROLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":(?:[a-z]+:)*[a-z]+:`([^`]+)`").expect("valid regex"));

static LITERAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"``([^`]+)``").expect("valid regex"));

/// Directive prefixes rewritten to plain words.
const DIRECTIVES: [(&str, &str); 5] = [
    (".. note::", "Note:"),
    (".. warning::", "Warning:"),
    (".. versionadded::", "New in version"),
    (".. versionchanged::", "Changed in version"),
    (".. deprecated::", "Deprecated since version"),
];

/// Strip reStructuredText markup from a docstring.
pub fn strip_rst(doc: &str) -> String {
    let mut text = CODE_BLOCK_RE.replace_all(doc, "").into_owned();
    for (directive, plain) in DIRECTIVES {
        text = text.replace(directive, plain);
    }
    let text = ROLE_RE.replace_all(&text, "$1");
    LITERAL_RE.replace_all(&text, "$1").into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
