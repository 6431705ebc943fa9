//! Shell command execution on the jail host
//!
//! Every remote operation is a blocking round-trip through an [`Executor`]:
//! argv plus optional stdin in, exit code and captured output back. The
//! concrete executor runs argv directly on the local machine or wraps it
//! in an `ssh` invocation for a remote host. Connection failures surface
//! as transport errors carrying the target's identity.

use crate::error::{Error, Result};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

/// Captured result of one command invocation
#[derive(Debug, Clone)]
pub struct ExecOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Command execution capability
///
/// Implementations own transport-level connection handling and are safe to
/// reuse across calls.
pub trait Executor {
    fn execute(&self, argv: &[String], stdin: Option<&str>) -> Result<ExecOutput>;
}

/// Where commands run
pub enum Target {
    Local,
    Ssh(String),
}

/// Executor running argv through a local shell or an SSH connection
pub struct ShellExec {
    target: Target,
    prefix: Vec<String>,
    debug: bool,
}

impl ShellExec {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            prefix: Vec::new(),
            debug: false,
        }
    }

    /// Prefix every invocation with sudo
    pub fn sudo(mut self, enable: bool) -> Self {
        if enable {
            self.prefix = vec!["sudo".to_string()];
        }
        self
    }

    /// Log every command line at debug level before running it
    pub fn debug_commands(mut self, enable: bool) -> Self {
        self.debug = enable;
        self
    }

    /// Connection identity used in transport errors
    pub fn host(&self) -> &str {
        match &self.target {
            Target::Local => "localhost",
            Target::Ssh(host) => host,
        }
    }

    /// Full argv including the sudo prefix
    fn full_argv(&self, argv: &[String]) -> Vec<String> {
        self.prefix.iter().chain(argv.iter()).cloned().collect()
    }

    /// Program and arguments actually handed to the OS
    ///
    /// For SSH the remote argv is joined into a single shell-quoted string,
    /// so tokens containing whitespace or quotes survive the remote shell.
    fn build(&self, argv: &[String]) -> (String, Vec<String>) {
        match &self.target {
            Target::Local => (argv[0].clone(), argv[1..].to_vec()),
            Target::Ssh(host) => (
                "ssh".to_string(),
                vec![host.clone(), "--".to_string(), shjoin(argv)],
            ),
        }
    }

    fn transport(&self, e: std::io::Error) -> Error {
        Error::Transport {
            host: self.host().to_string(),
            message: e.to_string(),
        }
    }
}

impl Executor for ShellExec {
    fn execute(&self, argv: &[String], stdin: Option<&str>) -> Result<ExecOutput> {
        let argv = self.full_argv(argv);
        if self.debug {
            debug!("running: {}", shjoin(&argv));
        }
        let (program, args) = self.build(&argv);
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| self.transport(e))?;
        if let Some(payload) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            pipe.write_all(payload.as_bytes())
                .map_err(|e| self.transport(e))?;
        }
        let output = child.wait_with_output().map_err(|e| self.transport(e))?;
        Ok(ExecOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Quote a token for a POSIX shell
pub fn shquote(token: &str) -> String {
    let safe = |c: char| c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c);
    if !token.is_empty() && token.chars().all(safe) {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', "'\\''"))
    }
}

/// Join argv into a single shell command line
pub fn shjoin(argv: &[String]) -> String {
    argv.iter()
        .map(|a| shquote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Convenience for building owned argv from literals
pub fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shquote_safe_tokens() {
        assert_eq!(shquote("start"), "start");
        assert_eq!(shquote("tag=foo"), "tag=foo");
        assert_eq!(shquote("/usr/local/sbin/iocage"), "/usr/local/sbin/iocage");
    }

    #[test]
    fn test_shquote_special_tokens() {
        assert_eq!(shquote(""), "''");
        assert_eq!(shquote("a b"), "'a b'");
        assert_eq!(
            shquote("ip4_addr=\"10.0.0.1\""),
            "'ip4_addr=\"10.0.0.1\"'"
        );
        assert_eq!(shquote("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_shjoin() {
        let argv = argv(&["sh", "-c", "cat - > \"/tmp/x\""]);
        assert_eq!(shjoin(&argv), "sh -c 'cat - > \"/tmp/x\"'");
    }

    #[test]
    fn test_sudo_prefix() {
        let exec = ShellExec::new(Target::Local).sudo(true);
        assert_eq!(
            exec.full_argv(&argv(&["iocage", "list"])),
            argv(&["sudo", "iocage", "list"])
        );
    }

    #[test]
    fn test_ssh_wrapping() {
        let exec = ShellExec::new(Target::Ssh("jailhost".to_string()));
        let (program, args) = exec.build(&argv(&["iocage", "start", "foo"]));
        assert_eq!(program, "ssh");
        assert_eq!(args, argv(&["jailhost", "--", "iocage start foo"]));
    }

    #[test]
    fn test_local_execute_roundtrip() {
        let exec = ShellExec::new(Target::Local);
        let out = exec.execute(&argv(&["cat"]), Some("hello")).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello");
    }

    #[test]
    fn test_local_execute_exit_code() {
        let exec = ShellExec::new(Target::Local);
        let out = exec
            .execute(&argv(&["sh", "-c", "echo oops >&2; exit 3"]), None)
            .unwrap();
        assert_eq!(out.code, 3);
        assert_eq!(out.stderr, "oops\n");
    }

    #[test]
    fn test_spawn_failure_is_transport_error() {
        let exec = ShellExec::new(Target::Local);
        let err = exec
            .execute(&argv(&["/nonexistent/harbormaster-test-binary"]), None)
            .unwrap_err();
        match err {
            crate::error::Error::Transport { host, .. } => assert_eq!(host, "localhost"),
            other => panic!("expected transport error, got {other:?}"),
        }
    }
}
