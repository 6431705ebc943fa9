//! Command protocol adapter for the iocage administrative tool
//!
//! Translates logical operations into validated argv sequences and maps
//! tool failure (nonzero exit) to a typed error carrying stderr. Every
//! argument is checked for internal whitespace before it becomes an argv
//! token; the one exception is the `console` payload, which is itself a
//! shell command line and travels over stdin instead.

pub mod output;

use self::output::JailRecord;
use crate::error::{Error, Result};
use crate::exec::{ExecOutput, Executor};
use std::collections::BTreeMap;
use std::rc::Rc;

/// Adapter driving the administrative binary through an [`Executor`]
pub struct IocageAdmin {
    exec: Rc<dyn Executor>,
    binary: String,
    // Header layout calibration result, populated on first `list`
    fields: Option<&'static [&'static str; 5]>,
}

impl IocageAdmin {
    pub fn new(exec: Rc<dyn Executor>, binary: impl Into<String>) -> Self {
        Self {
            exec,
            binary: binary.into(),
            fields: None,
        }
    }

    fn invoke(&self, args: &[&str], stdin: Option<&str>) -> Result<ExecOutput> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.binary.clone());
        argv.extend(args.iter().map(|a| a.to_string()));
        self.exec.execute(&argv, stdin)
    }

    fn invoke_checked(&self, args: &[&str]) -> Result<ExecOutput> {
        let out = self.invoke(args, None)?;
        if !out.success() {
            return Err(Error::Tool {
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out)
    }

    /// Calibrate the header layout once per adapter lifetime
    ///
    /// The calibration runs its own `list` invocation, so the first call
    /// to [`IocageAdmin::list`] hits the tool twice.
    fn calibrate(&mut self) -> Result<&'static [&'static str; 5]> {
        if let Some(fields) = self.fields {
            return Ok(fields);
        }
        let out = self.invoke_checked(&["list"])?;
        let fields = output::calibrate(&out.stdout)?;
        self.fields = Some(fields);
        Ok(fields)
    }

    /// Fetch the live jail table, keyed by tag
    pub fn list(&mut self) -> Result<BTreeMap<String, JailRecord>> {
        self.calibrate()?;
        let out = self.invoke_checked(&["list"])?;
        output::parse_records(&out.stdout)
    }

    /// Create a jail with the given tag and IPv4 address
    pub fn create(&self, tag: &str, ip: &str, jailtype: Option<&str>) -> Result<()> {
        check_argument("tag", tag)?;
        check_argument("ip", ip)?;
        let mut args = vec!["create"];
        if let Some(jailtype) = jailtype {
            check_argument("jailtype", jailtype)?;
            args.push(jailtype);
        }
        let tag_arg = format!("tag={tag}");
        let ip_arg = format!("ip4_addr=\"{ip}\"");
        args.push(&tag_arg);
        args.push(&ip_arg);
        self.invoke_checked(&args).map(|_| ())
    }

    pub fn start(&self, tag: &str) -> Result<()> {
        check_argument("tag", tag)?;
        self.invoke_checked(&["start", tag]).map(|_| ())
    }

    pub fn stop(&self, tag: &str) -> Result<()> {
        check_argument("tag", tag)?;
        self.invoke_checked(&["stop", tag]).map(|_| ())
    }

    /// Destroy a jail, forcing removal
    pub fn destroy(&self, tag: &str) -> Result<()> {
        check_argument("tag", tag)?;
        self.invoke_checked(&["destroy", "-f", tag]).map(|_| ())
    }

    /// Run a one-shot command inside a jail through the tool's console
    ///
    /// The command is the interactive payload, fed over stdin rather than
    /// embedded in argv, and is deliberately exempt from the whitespace
    /// check.
    pub fn console(&self, tag: &str, cmd: &str) -> Result<ExecOutput> {
        check_argument("tag", tag)?;
        let out = self.invoke(&["console", tag], Some(cmd))?;
        if !out.success() {
            return Err(Error::Tool {
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(out)
    }
}

fn check_argument(name: &str, value: &str) -> Result<()> {
    if value.split_whitespace().count() != 1 {
        return Err(Error::Validation(format!(
            "The value '{value}' of argument '{name}' contains whitespace"
        )));
    }
    Ok(())
}
