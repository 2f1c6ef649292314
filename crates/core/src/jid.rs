//! Job identifier generation.
//!
//! A jid is the local wall-clock time at dispatch, formatted
//! `YYYYMMDDhhmmssffffff` (microsecond resolution, 20 digits). Ids compare
//! lexicographically in issue order.
//!
//! Two dispatches inside the same microsecond would naturally share a
//! timestamp. [`JidGenerator`] remembers the last timestamp it issued and
//! bumps by one microsecond whenever the clock has not moved past it, so ids
//! from one generator are strictly increasing. Ids from different processes
//! can still collide; `unique` mode appends `_<pid>` to rule that out.

use std::sync::Mutex;

use chrono::{Local, NaiveDateTime, TimeDelta, Timelike};

/// `strftime` layout of the timestamp part of a jid.
pub const JID_FORMAT: &str = "%Y%m%d%H%M%S%6f";

/// Number of digits in the timestamp part of a jid.
pub const JID_TIMESTAMP_LEN: usize = 20;

static PROCESS_JIDS: JidGenerator = JidGenerator::new();

/// Generate a jid from the process-wide generator.
pub fn gen_jid(unique: bool) -> String {
    PROCESS_JIDS.generate(unique)
}

/// Whether `value` looks like a jid produced by this module.
pub fn is_jid(value: &str) -> bool {
    let (stamp, pid) = match value.split_once('_') {
        Some((stamp, pid)) => (stamp, Some(pid)),
        None => (value, None),
    };
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    stamp.len() == JID_TIMESTAMP_LEN && digits(stamp) && pid.map_or(true, digits)
}

/// Monotonic timestamp-based jid source.
#[derive(Debug, Default)]
pub struct JidGenerator {
    last: Mutex<Option<NaiveDateTime>>,
}

impl JidGenerator {
    pub const fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }

    /// Issue the next jid, optionally suffixed with the current process id.
    pub fn generate(&self, unique: bool) -> String {
        let stamp = self.next_timestamp(Local::now().naive_local());
        let jid = stamp.format(JID_FORMAT).to_string();
        if unique {
            format!("{jid}_{}", std::process::id())
        } else {
            jid
        }
    }

    fn next_timestamp(&self, now: NaiveDateTime) -> NaiveDateTime {
        let now = truncate_to_micros(now);
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let next = match *last {
            Some(previous) if now <= previous => previous + TimeDelta::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        next
    }
}

fn truncate_to_micros(at: NaiveDateTime) -> NaiveDateTime {
    let nanos = at.nanosecond() / 1_000 * 1_000;
    at.with_nanosecond(nanos).unwrap_or(at)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
