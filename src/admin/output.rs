//! Parsing of the administrative tool's `list` output
//!
//! The output's first two lines are a header row and a dashed separator
//! row whose runs of `-` mark the column extents. Header labels are
//! recovered from that pair and must match the expected layout exactly;
//! the tool's output format is versioned and stable, so any deviation is
//! a fatal protocol error rather than something to fuzzy-match around.

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Header labels the tool is known to emit
pub const EXPECTED_HEADERS: [&str; 5] = ["STA", "JID", "IP", "Hostname", "Root Directory"];

/// Internal field names, in column order
pub const FIELDS: [&str; 5] = ["status", "jid", "ip", "tag", "root"];

/// One row of the `list` table, keyed externally by tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JailRecord {
    pub status: String,
    pub jid: String,
    pub ip: String,
    pub root: String,
}

/// Validate the header layout of a `list` output and return the internal
/// field names
pub fn calibrate(out: &str) -> Result<&'static [&'static str; 5]> {
    let lines: Vec<&str> = out.lines().collect();
    if lines.len() < 2 {
        return Err(Error::Protocol(format!(
            "iocage list output too short:\n{}",
            out.trim()
        )));
    }
    let headers = header_labels(lines[0], lines[1]);
    if headers != EXPECTED_HEADERS {
        return Err(Error::Protocol(format!(
            "iocage list output has unknown headers:\n{headers:?}"
        )));
    }
    Ok(&FIELDS)
}

/// Cut the header row into labels at the column extents the separator row
/// marks with runs of `-`
fn header_labels(header: &str, separator: &str) -> Vec<String> {
    let header: Vec<char> = header.chars().collect();
    let mut labels = Vec::new();
    let mut current = String::new();
    for (i, c) in separator.chars().enumerate() {
        if c != '-' || i >= header.len() {
            labels.push(current.trim().to_string());
            if i >= header.len() {
                break;
            }
            current.clear();
        } else {
            current.push(header[i]);
        }
    }
    labels
}

/// Parse the data rows of a `list` output into a tag-keyed record map
pub fn parse_records(out: &str) -> Result<BTreeMap<String, JailRecord>> {
    let lines: Vec<&str> = out.lines().collect();
    if lines.len() < 2 {
        return Err(Error::Protocol(format!(
            "iocage list output too short:\n{}",
            out.trim()
        )));
    }
    let mut jails = BTreeMap::new();
    for line in &lines[2..] {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // Tokens follow FIELDS order: status, jid, ip, tag, root
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < FIELDS.len() {
            return Err(Error::Protocol(format!(
                "malformed iocage list row:\n{line}"
            )));
        }
        jails.insert(
            tokens[3].to_string(),
            JailRecord {
                status: tokens[0].to_string(),
                jid: tokens[1].to_string(),
                ip: tokens[2].to_string(),
                root: tokens[4].to_string(),
            },
        );
    }
    Ok(jails)
}
