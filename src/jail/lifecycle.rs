//! Jail lifecycle orchestration
//!
//! Sequences creation, startup-script injection, mount setup, and
//! start/stop/terminate against the live jail table. Status is re-derived
//! from the administrative tool on every operation; the tool is the sole
//! source of truth and can be mutated out-of-band, so nothing here caches
//! jail state between operations.

use crate::admin::output::JailRecord;
use crate::admin::IocageAdmin;
use crate::error::{Error, Result};
use crate::exec::{argv, Executor, ShellExec, Target};
use crate::jail::mounts;
use crate::jail::status::{self, JailStatus};
use crate::manifest::{Config, JailDef};
use crate::zfs::ZfsResolver;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// rc.d integration script written into every new jail
///
/// Runs the startup script once at first boot, removes itself, and drops
/// the payload's execute bit.
const RC_STARTUP: &str = r#"#!/bin/sh
#
# BEFORE: DAEMON
# PROVIDE: ploy.startup_script
#
# ploy startup script

. /etc/rc.subr

name=ploy.startup_script
start_cmd=startup

startup() {

# Remove traces of ourself
# N.B.: Do NOT rm $0, it points to /etc/rc
##########################
  rm -f "/etc/rc.d/ploy.startup_script"

  test -e /etc/startup_script && /etc/startup_script || true
  test -e /etc/startup_script && chmod 0600 /etc/startup_script

}

run_rc_command "$1"
"#;

/// Status of one declared jail, for machine-readable reporting
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub name: String,
    pub tag: String,
    pub host: String,
    pub status: String,
    pub jid: Option<String>,
    pub ip: Option<String>,
}

/// The jail host and its declared jails
///
/// Constructed once per run; owns the protocol adapter, the ZFS resolver,
/// and the registry of configured jails.
pub struct Master {
    exec: Rc<dyn Executor>,
    admin: IocageAdmin,
    zfs: ZfsResolver,
    jails: BTreeMap<String, JailDef>,
    base_dir: PathBuf,
}

impl Master {
    pub fn new(config: Config) -> Self {
        let target = match &config.master.host {
            Some(host) => Target::Ssh(host.clone()),
            None => Target::Local,
        };
        let exec: Rc<dyn Executor> = Rc::new(
            ShellExec::new(target)
                .sudo(config.master.sudo)
                .debug_commands(config.master.debug_commands),
        );
        Self::with_executor(exec, config)
    }

    /// Construct with an explicit executor (tests inject a scripted one)
    pub fn with_executor(exec: Rc<dyn Executor>, config: Config) -> Self {
        let admin = IocageAdmin::new(exec.clone(), config.master.iocage.clone());
        let zfs = ZfsResolver::new(exec.clone(), config.zfs);
        Self {
            exec,
            admin,
            zfs,
            jails: config.jails,
            base_dir: config.base_dir,
        }
    }

    /// Names of all declared jails
    pub fn jail_names(&self) -> Vec<String> {
        self.jails.keys().cloned().collect()
    }

    fn jail(&self, name: &str) -> Result<JailDef> {
        self.jails
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownJail(name.to_string()))
    }

    /// Start a jail, creating and provisioning it first if needed
    pub fn start(&mut self, name: &str) -> Result<()> {
        let jail = self.jail(name)?;
        let tag = jail.tag(name).to_string();
        let mut jails = self.admin.list()?;
        let mut status = status::resolve(&tag, &jails)?;
        let mut with_startup_script = false;
        if status == JailStatus::Unavailable {
            let payload = self.startup_payload(&jail)?;
            info!("Creating instance '{name}'");
            let Some(ip) = jail.ip else {
                error!("No IP address set for instance '{name}'");
                return Err(Error::Aborted);
            };
            self.admin
                .create(&tag, &ip.to_string(), jail.jailtype.as_deref())
                .map_err(abort_tool)?;
            jails = self.admin.list()?;
            let root = jails
                .get(&tag)
                .map(|record| record.root.clone())
                .ok_or_else(|| {
                    Error::Protocol(format!(
                        "jail '{tag}' missing from list output after create"
                    ))
                })?;
            self.write_jail_file(
                &format!("{root}/etc/startup_script"),
                &payload,
                "Startup script",
            )?;
            self.write_jail_file(
                &format!("{root}/etc/rc.d/ploy.startup_script"),
                RC_STARTUP,
                "Startup rc script",
            )?;
            status = status::resolve(&tag, &jails)?;
            with_startup_script = !payload.is_empty();
        }
        if status != JailStatus::Stopped {
            info!("Instance state: {status}");
            info!("Instance already started");
            return Ok(());
        }
        if !jail.mounts.is_empty() {
            let root = jails
                .get(&tag)
                .map(|record| record.root.clone())
                .ok_or_else(|| {
                    Error::Protocol(format!("jail '{tag}' missing from list output"))
                })?;
            mounts::provision(self.exec.as_ref(), &mut self.zfs, &tag, &root, &jail.mounts)?;
        }
        if with_startup_script {
            info!("Starting instance '{name}' with startup script, this can take a while.");
        } else {
            info!("Starting instance '{name}'");
        }
        self.admin.start(&tag).map_err(abort_tool)
    }

    /// Stop a running jail
    pub fn stop(&mut self, name: &str) -> Result<()> {
        let jail = self.jail(name)?;
        let tag = jail.tag(name).to_string();
        let jails = self.admin.list()?;
        let status = status::resolve(&tag, &jails)?;
        if status == JailStatus::Unavailable {
            info!("Instance '{name}' unavailable");
            return Ok(());
        }
        if status != JailStatus::Running {
            info!("Instance state: {status}");
            info!("Instance not stopped");
            return Ok(());
        }
        info!("Stopping instance '{name}'");
        self.admin.stop(&tag)?;
        info!("Instance stopped");
        Ok(())
    }

    /// Stop and destroy a jail
    ///
    /// Waits for the jail to reach the stopped state before destroying it.
    /// The wait polls the live table once per second without a timeout;
    /// jail shutdown timing is host-dependent.
    pub fn terminate(&mut self, name: &str) -> Result<()> {
        let jail = self.jail(name)?;
        let tag = jail.tag(name).to_string();
        let jails = self.admin.list()?;
        let mut status = status::resolve(&tag, &jails)?;
        if jail.no_terminate {
            error!("Instance '{name}' is configured not to be terminated.");
            return Ok(());
        }
        if status == JailStatus::Unavailable {
            info!("Instance '{name}' unavailable");
            return Ok(());
        }
        if status == JailStatus::Running {
            info!("Stopping instance '{name}'");
            self.admin.stop(&tag)?;
        }
        if status != JailStatus::Stopped {
            info!("Waiting for jail to stop");
            while status != JailStatus::Stopped {
                let jails = self.admin.list()?;
                status = status::resolve(&tag, &jails)?;
                print!(".");
                let _ = std::io::stdout().flush();
                thread::sleep(Duration::from_secs(1));
            }
            println!();
        }
        info!("Terminating instance '{name}'");
        self.admin.destroy(&tag)?;
        info!("Instance terminated");
        Ok(())
    }

    /// Report the status of one declared jail
    ///
    /// Read-only: adapter failures degrade to a logged error and a normal
    /// return.
    pub fn status(&mut self, name: &str) -> Result<()> {
        let jail = self.jail(name)?;
        let tag = jail.tag(name).to_string();
        let jails = match self.admin.list() {
            Ok(jails) => jails,
            Err(e) => {
                error!("Can't get status of jails: {e}");
                return Ok(());
            }
        };
        let status = status::resolve(&tag, &jails)?;
        if status == JailStatus::Unavailable {
            info!("Instance '{name}' unavailable");
            return Ok(());
        }
        if status != JailStatus::Running {
            info!("Instance state: {status}");
            return Ok(());
        }
        let record = &jails[&tag];
        info!("Instance running.");
        info!("Instances jail id: {}", record.jid);
        if tag != name {
            info!("Instances jail tag: {tag}");
        }
        info!("Instances jail ip: {}", record.ip);
        Ok(())
    }

    /// Cross-check every declared jail against the live table
    ///
    /// Flags running jails whose live IP differs from the configured one,
    /// and jails present on the host but not declared in configuration.
    pub fn status_all(&mut self) -> Result<()> {
        let jails = match self.admin.list() {
            Ok(jails) => jails,
            Err(e) => {
                error!("Can't get status of jails: {e}");
                return Ok(());
            }
        };
        let mut unknown: BTreeSet<&str> = jails.keys().map(String::as_str).collect();
        for (name, jail) in &self.jails {
            let tag = jail.tag(name);
            unknown.remove(tag);
            let status = status::resolve(tag, &jails)?;
            let configured_ip = jail.ip.map(|ip| ip.to_string()).unwrap_or_default();
            let live_ip = jails
                .get(tag)
                .map(|record| record.ip.clone())
                .unwrap_or_else(|| "unknown ip".to_string());
            let shown = if status == JailStatus::Running && live_ip != configured_ip {
                format!("{live_ip} != configured {configured_ip}")
            } else {
                configured_ip
            };
            info!("{name:<20} {status:<15} {shown:>15}");
        }
        for tag in unknown {
            let live_ip = jails
                .get(tag)
                .map(|record| record.ip.clone())
                .unwrap_or_else(|| "unknown ip".to_string());
            warn!("Unknown jail found: {tag:<20} {live_ip:>15}");
        }
        Ok(())
    }

    /// Structured status of one declared jail
    pub fn status_report(&mut self, name: &str) -> Result<StatusReport> {
        let jail = self.jail(name)?;
        let tag = jail.tag(name).to_string();
        let jails = self.admin.list()?;
        let status = status::resolve(&tag, &jails)?;
        let record = jails.get(&tag);
        Ok(StatusReport {
            name: name.to_string(),
            host: jail
                .host
                .clone()
                .or_else(|| jail.ip.map(|ip| ip.to_string()))
                .unwrap_or_default(),
            tag,
            status: status.to_string(),
            jid: record.map(|r| r.jid.clone()),
            ip: record.map(|r| r.ip.clone()),
        })
    }

    /// Run a one-shot command inside a running jail and return its output
    pub fn console(&mut self, name: &str, cmd: &str) -> Result<String> {
        let jail = self.jail(name)?;
        let tag = jail.tag(name).to_string();
        let jails = self.admin.list()?;
        let status = status::resolve(&tag, &jails)?;
        if status == JailStatus::Unavailable {
            error!("Instance '{name}' unavailable");
            return Err(Error::Aborted);
        }
        if status != JailStatus::Running {
            error!("Instance state: {status}");
            return Err(Error::Aborted);
        }
        let out = self.admin.console(&tag, cmd)?;
        Ok(out.stdout)
    }

    /// SSH host key fingerprint of a running jail
    pub fn fingerprint(&mut self, name: &str) -> Result<String> {
        let jail = self.jail(name)?;
        let tag = jail.tag(name).to_string();
        let jails = self.admin.list()?;
        let status = status::resolve(&tag, &jails)?;
        if status == JailStatus::Unavailable {
            info!("Instance '{name}' unavailable");
            return Err(Error::Aborted);
        }
        if status != JailStatus::Running {
            info!("Instance state: {status}");
            return Err(Error::Aborted);
        }
        let out = self
            .admin
            .console(&tag, "ssh-keygen -lf /etc/ssh/ssh_host_rsa_key.pub")?;
        out.stdout
            .split_whitespace()
            .nth(1)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::Protocol(format!(
                    "unexpected ssh-keygen output:\n{}",
                    out.stdout.trim()
                ))
            })
    }

    /// The live jail table, keyed by tag
    pub fn list(&mut self) -> Result<BTreeMap<String, JailRecord>> {
        self.admin.list()
    }

    fn startup_payload(&self, jail: &JailDef) -> Result<String> {
        let Some(path) = &jail.startup_script else {
            return Ok(String::new());
        };
        let path = if path.is_absolute() {
            path.clone()
        } else {
            self.base_dir.join(path)
        };
        fs::read_to_string(&path).map_err(|e| {
            error!("Failed to read startup script '{}': {e}", path.display());
            Error::Aborted
        })
    }

    fn write_jail_file(&self, dest: &str, content: &str, what: &str) -> Result<()> {
        let out = self.exec.execute(
            &argv(&["sh", "-c", &format!("cat - > \"{dest}\"")]),
            Some(content),
        )?;
        if !out.success() {
            error!("{what} creation failed.");
            error!("{}", out.stderr.trim_end());
            return Err(Error::Aborted);
        }
        let out = self.exec.execute(&argv(&["chmod", "0700", dest]), None)?;
        if !out.success() {
            error!("{what} chmod failed.");
            error!("{}", out.stderr.trim_end());
            return Err(Error::Aborted);
        }
        Ok(())
    }
}

/// Log a tool error's stderr line by line and turn it into an abort
fn abort_tool(e: Error) -> Error {
    if let Error::Tool { stderr } = &e {
        for line in stderr.lines() {
            error!("{line}");
        }
        return Error::Aborted;
    }
    e
}
