//! Fixed-key template substitution for mount and dataset path templates
//!
//! Exactly two bindings exist: `{tag}` expands to the jail tag and
//! `{zfs[<dataset>]}` to the dataset's resolved host mountpoint. Anything
//! else in braces is a configuration error.

use crate::error::{Error, Result};
use crate::zfs::ZfsResolver;

/// Expand a path template against the fixed bindings
pub fn expand(template: &str, tag: Option<&str>, zfs: &mut ZfsResolver) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            return Err(Error::Validation(format!(
                "Unclosed substitution in template '{template}'"
            )));
        };
        let key = &after[..end];
        if key == "tag" {
            let tag = tag.ok_or_else(|| {
                Error::Validation(format!(
                    "'{{tag}}' is not available in template '{template}'"
                ))
            })?;
            out.push_str(tag);
        } else if let Some(dataset) = key.strip_prefix("zfs[").and_then(|k| k.strip_suffix(']')) {
            out.push_str(&zfs.resolve(dataset)?);
        } else {
            return Err(Error::Validation(format!(
                "Unknown substitution '{{{key}}}' in template '{template}'"
            )));
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
