//! Event tag construction.
//!
//! Tags are `/`-separated topic strings. A job's tag is
//! `salt/<prefix>/<jid>`; its lifecycle events are published under
//! `<tag>/new`, `<tag>/progress` and `<tag>/ret`. Every function here is
//! pure.

/// Root namespace of every tag.
pub const TAG_BASE: &str = "salt";

/// Separator between tag parts.
pub const TAG_SEPARATOR: &str = "/";

/// Lifecycle stage of a job, used as the final tag part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Published before the function is invoked.
    New,
    /// Published by the function while it runs, between `new` and `ret`.
    Progress,
    /// Published after the function returned or failed.
    Ret,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Progress => "progress",
            Self::Ret => "ret",
        }
    }
}

/// Join the non-empty parts of `[base, prefix, suffix...]` with `/`.
pub fn tagify(suffix: &[&str], prefix: &str, base: &str) -> String {
    [base, prefix]
        .into_iter()
        .chain(suffix.iter().copied())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(TAG_SEPARATOR)
}

/// Tag under which every event of job `jid` is published.
pub fn job_tag(prefix: &str, jid: &str) -> String {
    tagify(&[jid], prefix, TAG_BASE)
}

/// Tag of one lifecycle event of a job tagged `tag`.
pub fn lifecycle_tag(tag: &str, stage: Stage) -> String {
    tagify(&[stage.as_str()], "", tag)
}

/// Whether `tag` equals `prefix` or lies underneath it.
pub fn tag_matches(tag: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    let prefix = prefix.strip_suffix(TAG_SEPARATOR).unwrap_or(prefix);
    tag == prefix
        || tag
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(TAG_SEPARATOR))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
