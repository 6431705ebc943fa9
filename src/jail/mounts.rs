//! Mount provisioning and static mount table rewriting
//!
//! Resolves configured mount templates against the fixed `{tag}` /
//! `{zfs[<dataset>]}` bindings, creates source directories on demand, and
//! rewrites `/etc/fstab.<tag>` on the jail host. Only the table's first
//! line survives the rewrite; the managed region below the marker is
//! owned outright, unmanaged entries are not preserved.

use crate::error::{Error, Result};
use crate::exec::{argv, Executor};
use crate::manifest::MountSpec;
use crate::template;
use crate::zfs::ZfsResolver;
use tracing::{error, info};

pub const FSTAB_MARKER: &str = "# mount points from harbormaster";

struct ResolvedMount {
    src: String,
    dst: String,
    ro: bool,
}

/// Set up the configured mounts for a jail and rewrite its mount table
pub fn provision(
    exec: &dyn Executor,
    zfs: &mut ZfsResolver,
    tag: &str,
    jail_root: &str,
    specs: &[MountSpec],
) -> Result<()> {
    let mut mounts = Vec::with_capacity(specs.len());
    for spec in specs {
        let src_template = spec
            .src
            .as_deref()
            .ok_or_else(|| Error::Validation("Mount definition is missing 'src'.".to_string()))?;
        let dst_template = spec
            .dst
            .as_deref()
            .ok_or_else(|| Error::Validation("Mount definition is missing 'dst'.".to_string()))?;
        let src = template::expand(src_template, Some(tag), zfs)?;
        let dst = template::expand(dst_template, Some(tag), zfs)?;
        if spec.create {
            let out = exec.execute(&argv(&["mkdir", "-p", &src]), None)?;
            if !out.success() {
                error!("Couldn't create source directory '{src}' for mountpoint '{src_template}'.");
                error!("{}", out.stderr.trim_end());
                return Err(Error::Aborted);
            }
        }
        mounts.push(ResolvedMount {
            src,
            dst,
            ro: spec.ro,
        });
    }
    if mounts.is_empty() {
        return Ok(());
    }

    let fstab = format!("/etc/fstab.{tag}");
    let root = jail_root.trim_end_matches('/');
    info!("Setting up mount points");
    let head = exec.execute(&argv(&["head", "-n", "1", &fstab]), None)?;
    let mut lines: Vec<String> = head.stdout.lines().take(1).map(String::from).collect();
    lines.push(FSTAB_MARKER.to_string());
    for mount in &mounts {
        let dest = format!("{root}{}", mount.dst);
        let out = exec.execute(&argv(&["mkdir", "-p", &dest]), None)?;
        if !out.success() {
            error!("Couldn't create mount destination '{dest}'.");
            error!("{}", out.stderr.trim_end());
            return Err(Error::Aborted);
        }
        let mode = if mount.ro { "ro" } else { "rw" };
        lines.push(format!("{} {} nullfs {} 0 0", mount.src, dest, mode));
    }
    lines.push(String::new());
    let out = exec.execute(
        &argv(&["sh", "-c", &format!("cat - > \"{fstab}\"")]),
        Some(&lines.join("\n")),
    )?;
    if !out.success() {
        error!("Couldn't write mount table '{fstab}'.");
        error!("{}", out.stderr.trim_end());
        return Err(Error::Aborted);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::{expect, Expect, ScriptedExec};
    use crate::manifest::{parse_mounts, Config};
    use std::rc::Rc;

    fn provision_with(
        script: Vec<Expect>,
        zfs_toml: &str,
        mounts: &str,
    ) -> (Rc<ScriptedExec>, Result<()>) {
        let config: Config = toml::from_str(zfs_toml).unwrap();
        let exec = Rc::new(ScriptedExec::new(script));
        let shared: Rc<dyn Executor> = exec.clone();
        let mut zfs = ZfsResolver::new(shared, config.zfs);
        let specs = parse_mounts(mounts).unwrap();
        let result = provision(exec.as_ref(), &mut zfs, "foo", "/usr/jails/foo/", &specs);
        (exec, result)
    }

    #[test]
    fn test_no_mounts_is_a_noop() {
        let (exec, result) = provision_with(Vec::new(), "", "");
        result.unwrap();
        exec.assert_drained();
    }

    #[test]
    fn test_provision_rewrites_fstab() {
        let (exec, result) = provision_with(
            vec![
                expect(
                    "zfs get -Hp -o property,value mountpoint tank/backup",
                    0,
                    "mountpoint\t/tank/backup\n",
                    "",
                ),
                expect("mkdir -p /tank/backup/foo", 0, "", ""),
                expect(
                    "head -n 1 /etc/fstab.foo",
                    0,
                    "/dev/ada0p2 / ufs rw 1 1\n",
                    "",
                ),
                expect("mkdir -p /usr/jails/foo/backup", 0, "", ""),
                expect("mkdir -p /usr/jails/foo/var/log", 0, "", ""),
                expect("sh -c 'cat - > \"/etc/fstab.foo\"'", 0, "", ""),
            ],
            r#"
            [zfs.backup]
            path = "tank/backup"
            "#,
            "src={zfs[backup]}/{tag} dst=/backup create=yes ro=no\nsrc=/var/log/{tag} dst=/var/log ro=yes",
        );
        result.unwrap();
        let written = exec.stdin_log();
        assert_eq!(written.len(), 1);
        assert_eq!(
            written[0].1,
            "/dev/ada0p2 / ufs rw 1 1\n\
             # mount points from harbormaster\n\
             /tank/backup/foo /usr/jails/foo/backup nullfs rw 0 0\n\
             /var/log/foo /usr/jails/foo/var/log nullfs ro 0 0\n"
        );
        exec.assert_drained();
    }

    #[test]
    fn test_source_mkdir_failure_aborts() {
        let (exec, result) = provision_with(
            vec![expect(
                "mkdir -p /tank/data",
                1,
                "",
                "mkdir: permission denied\n",
            )],
            "",
            "src=/tank/data dst=/data create=yes",
        );
        assert!(matches!(result.unwrap_err(), Error::Aborted));
        exec.assert_drained();
    }

    #[test]
    fn test_missing_dst_is_rejected() {
        let (exec, result) = provision_with(Vec::new(), "", "src=/tank/data");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("missing 'dst'"));
        exec.assert_drained();
    }
}
