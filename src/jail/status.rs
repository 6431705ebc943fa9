//! Normalized jail status derived from the tool's 2-character status code
//!
//! The first character is the mount state, the second the run state. Both
//! must belong to their fixed valid sets; anything else means the tool's
//! output contract changed and is an unrecoverable error, not something
//! to guess a policy for.

use crate::admin::output::JailRecord;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

const MOUNT_STATES: &str = "DIEBZ";
const RUN_STATES: &str = "RAS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JailStatus {
    Unavailable,
    Stopped,
    Running,
}

impl fmt::Display for JailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JailStatus::Unavailable => "unavailable",
            JailStatus::Stopped => "stopped",
            JailStatus::Running => "running",
        })
    }
}

/// Resolve the status of `tag` from a parsed `list` table
pub fn resolve(tag: &str, jails: &BTreeMap<String, JailRecord>) -> Result<JailStatus> {
    let Some(record) = jails.get(tag) else {
        return Ok(JailStatus::Unavailable);
    };
    let code: Vec<char> = record.status.chars().collect();
    if code.len() != 2 || !MOUNT_STATES.contains(code[0]) || !RUN_STATES.contains(code[1]) {
        return Err(Error::Protocol(format!(
            "Invalid jail status '{}' for '{}'",
            record.status, tag
        )));
    }
    match code[1] {
        'R' => Ok(JailStatus::Running),
        'S' => Ok(JailStatus::Stopped),
        _ => Err(Error::Protocol(format!(
            "Don't know how to handle mounted but not running jail '{tag}'"
        ))),
    }
}
