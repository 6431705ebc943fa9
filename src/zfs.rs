//! ZFS dataset resolution on the jail host
//!
//! Datasets declared in `[zfs.<name>]` tables are resolved to their host
//! mountpoints through the remote shell, creating them on demand when
//! configured to. Mountpoints are cached per resolver instance since they
//! do not change within a run.

use crate::error::{Error, Result};
use crate::exec::{argv, Executor};
use crate::manifest::DatasetDef;
use crate::template;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::error;

pub struct ZfsResolver {
    exec: Rc<dyn Executor>,
    datasets: BTreeMap<String, DatasetDef>,
    mountpoints: BTreeMap<String, String>,
    // Names currently being path-expanded, to reject cyclic references
    resolving: Vec<String>,
}

impl ZfsResolver {
    pub fn new(exec: Rc<dyn Executor>, datasets: BTreeMap<String, DatasetDef>) -> Self {
        Self {
            exec,
            datasets,
            mountpoints: BTreeMap::new(),
            resolving: Vec::new(),
        }
    }

    /// Resolve a dataset name to its host mountpoint
    pub fn resolve(&mut self, name: &str) -> Result<String> {
        if let Some(mountpoint) = self.mountpoints.get(name) {
            return Ok(mountpoint.clone());
        }
        let def = self
            .datasets
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Zfs(format!("unknown zfs dataset '{name}'")))?;
        let path = self.expand_path(name, &def)?;

        let query = mountpoint_query(&path);
        let mut out = self.exec.execute(&query, None)?;
        if !out.success() && def.create {
            let mut args = argv(&["zfs", "create"]);
            for (property, value) in def.set_properties() {
                args.push("-o".to_string());
                args.push(format!("{property}={value}"));
            }
            args.push(path.clone());
            let created = self.exec.execute(&args, None)?;
            if !created.success() {
                error!("Couldn't create zfs filesystem '{name}' at '{path}'.");
                error!("{}", created.stderr.trim_end());
                return Err(Error::Zfs(format!(
                    "failed to create dataset '{name}' at '{path}'"
                )));
            }
            out = self.exec.execute(&query, None)?;
        }
        if out.success() {
            let mountpoint = parse_mountpoint(&out.stdout)?;
            self.mountpoints.insert(name.to_string(), mountpoint.clone());
            return Ok(mountpoint);
        }
        error!("Trying to use non existing zfs filesystem '{name}' at '{path}'.");
        Err(Error::Zfs(format!(
            "dataset '{name}' has no mountpoint at '{path}'"
        )))
    }

    /// Configured value for a dataset key; `path` is returned expanded (_unused: future feature)
    #[allow(dead_code)]
    pub fn property(&mut self, name: &str, key: &str) -> Result<Option<String>> {
        let def = self
            .datasets
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Zfs(format!("unknown zfs dataset '{name}'")))?;
        match key {
            "path" => self.expand_path(name, &def).map(Some),
            "create" => Ok(Some(def.create.to_string())),
            _ => Ok(def.options.get(key).cloned()),
        }
    }

    fn expand_path(&mut self, name: &str, def: &DatasetDef) -> Result<String> {
        if self.resolving.iter().any(|n| n == name) {
            return Err(Error::Zfs(format!(
                "cyclic zfs path reference involving '{name}'"
            )));
        }
        self.resolving.push(name.to_string());
        let path = template::expand(&def.path, None, self);
        self.resolving.pop();
        path
    }
}

fn mountpoint_query(path: &str) -> Vec<String> {
    argv(&[
        "zfs",
        "get",
        "-Hp",
        "-o",
        "property,value",
        "mountpoint",
        path,
    ])
}

fn parse_mountpoint(stdout: &str) -> Result<String> {
    let line = stdout.trim();
    let mut parts = line.split('\t');
    if parts.next() != Some("mountpoint") {
        return Err(Error::Protocol(format!(
            "unexpected zfs get output:\n{line}"
        )));
    }
    parts
        .next()
        .map(str::to_string)
        .ok_or_else(|| Error::Protocol(format!("unexpected zfs get output:\n{line}")))
}
