//! Configuration file parsing for Harbormaster
//!
//! Parses `harbormaster.toml` configuration files using serde

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// Load configuration from a file
pub fn load(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config: Config = toml::from_str(&content)?;

    // Relative startup script paths resolve against the config file
    config.base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    config.validate()?;

    Ok(config)
}

/// Root configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Jail host settings
    #[serde(default)]
    pub master: MasterDef,

    /// Jail definitions, keyed by instance name
    #[serde(default)]
    pub jails: BTreeMap<String, JailDef>,

    /// ZFS dataset definitions, keyed by dataset name
    #[serde(default)]
    pub zfs: BTreeMap<String, DatasetDef>,

    /// Directory of the config file
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, jail) in &self.jails {
            validate_tag(name)?;
            if let Some(tag) = &jail.tag {
                validate_tag(tag)?;
            }
        }
        Ok(())
    }
}

/// Check that a jail tag is acceptable to the administrative tool
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::Validation(format!(
            "Invalid instance tag '{tag}'. An iocage instance tag may only contain letters, numbers and underscores."
        )));
    }
    Ok(())
}

/// Jail host settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MasterDef {
    /// SSH target for the jail host; commands run locally when absent
    pub host: Option<String>,

    /// Prefix every invocation with sudo
    #[serde(default)]
    pub sudo: bool,

    /// Log every command line before running it
    #[serde(default)]
    pub debug_commands: bool,

    /// Path to the administrative binary on the jail host
    #[serde(default = "default_iocage_binary")]
    pub iocage: String,
}

impl Default for MasterDef {
    fn default() -> Self {
        Self {
            host: None,
            sudo: false,
            debug_commands: false,
            iocage: default_iocage_binary(),
        }
    }
}

fn default_iocage_binary() -> String {
    "/usr/local/sbin/iocage".to_string()
}

/// Jail definition from config file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JailDef {
    /// IPv4 address assigned at creation; required to create the jail
    pub ip: Option<Ipv4Addr>,

    /// Connect address override for this instance
    pub host: Option<String>,

    /// Administrative tag override; defaults to the instance name
    #[serde(rename = "iocage-tag")]
    pub tag: Option<String>,

    /// Jail type passed to `create` (e.g. basejail)
    pub jailtype: Option<String>,

    /// Refuse terminate requests for this jail
    #[serde(rename = "no-terminate", default)]
    pub no_terminate: bool,

    /// Mounts, one `key=value`-token line per mount
    #[serde(default, deserialize_with = "deserialize_mounts")]
    pub mounts: Vec<MountSpec>,

    /// Local file whose contents run once inside the jail at first boot
    pub startup_script: Option<PathBuf>,
}

impl JailDef {
    /// Tag the administrative tool tracks this jail under
    pub fn tag<'a>(&'a self, name: &'a str) -> &'a str {
        self.tag.as_deref().unwrap_or(name)
    }
}

/// One configured mount
///
/// `src` and `dst` are templates resolved at provisioning time; see
/// [`crate::template`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountSpec {
    pub src: Option<String>,
    pub dst: Option<String>,
    pub create: bool,
    pub ro: bool,
}

/// Parse the textual mount form: one mount per line, whitespace-separated
/// `key=value` tokens with keys `src`, `dst`, `create`, `ro`
pub fn parse_mounts(value: &str) -> Result<Vec<MountSpec>> {
    let mut mounts = Vec::new();
    for line in value.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        let mut spec = MountSpec::default();
        for token in tokens {
            let Some((key, val)) = token.split_once('=') else {
                return Err(Error::MountOption(token.to_string()));
            };
            let (key, val) = (key.trim(), val.trim());
            match key {
                "src" => spec.src = Some(val.to_string()),
                "dst" => spec.dst = Some(val.to_string()),
                "create" => spec.create = parse_mount_bool(key, val)?,
                "ro" => spec.ro = parse_mount_bool(key, val)?,
                _ => {
                    return Err(Error::Validation(format!(
                        "Unknown mount option '{key}'."
                    )));
                }
            }
        }
        mounts.push(spec);
    }
    Ok(mounts)
}

fn parse_mount_bool(key: &str, value: &str) -> Result<bool> {
    parse_bool(value).ok_or_else(|| {
        Error::Validation(format!(
            "Unknown value '{value}' for option '{key}' in mount definition."
        ))
    })
}

/// Boolean coercion for textual config values
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn deserialize_mounts<'de, D>(deserializer: D) -> std::result::Result<Vec<MountSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_mounts(&raw).map_err(serde::de::Error::custom)
}

/// ZFS dataset definition from a `[zfs.<name>]` table
///
/// `set-<property>` entries become `-o <property>=<value>` options when the
/// dataset is created on demand.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetDef {
    /// Dataset path template; may reference `{zfs[<other>]}`
    pub path: String,

    /// Create the dataset when its mountpoint cannot be resolved
    #[serde(default)]
    pub create: bool,

    /// Remaining keys, including `set-<property>` entries
    #[serde(flatten)]
    pub options: BTreeMap<String, String>,
}

impl DatasetDef {
    /// Properties to apply at creation time, `set-` prefix stripped
    pub fn set_properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.options
            .iter()
            .filter_map(|(k, v)| k.strip_prefix("set-").map(|p| (p, v.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mounts_roundtrip() {
        let mounts = parse_mounts("src=foo create=no ro=yes").unwrap();
        assert_eq!(
            mounts,
            vec![MountSpec {
                src: Some("foo".to_string()),
                dst: None,
                create: false,
                ro: true,
            }]
        );
    }

    #[test]
    fn test_mounts_multiple_lines() {
        let mounts = parse_mounts(
            "src=/tank/a dst=/a create=yes ro=no\n\nsrc=/tank/b dst=/b ro=yes\n",
        )
        .unwrap();
        assert_eq!(mounts.len(), 2);
        assert!(mounts[0].create);
        assert!(!mounts[0].ro);
        assert_eq!(mounts[1].dst.as_deref(), Some("/b"));
        assert!(mounts[1].ro);
    }

    #[test]
    fn test_mounts_invalid_option() {
        let err = parse_mounts("1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Mount option '1' contains no equal sign."
        );
    }

    #[test]
    fn test_mounts_invalid_bool() {
        let err = parse_mounts("src=foo create=maybe").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown value 'maybe' for option 'create' in mount definition."
        );
    }

    #[test]
    fn test_mounts_unknown_key() {
        let err = parse_mounts("src=foo nosuchkey=1").unwrap_err();
        assert_eq!(err.to_string(), "Unknown mount option 'nosuchkey'.");
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [master]
            host = "jailhost.example.com"
            sudo = true
            debug-commands = true

            [jails.foo]
            ip = "10.0.0.1"
            iocage-tag = "foo_prod"
            jailtype = "basejail"
            no-terminate = true
            mounts = "src={zfs[backup]}/{tag} dst=/backup create=yes ro=no"

            [zfs.backup]
            path = "tank/backup"
            create = true
            set-compression = "lz4"
            "#,
        )
        .unwrap();

        assert_eq!(config.master.host.as_deref(), Some("jailhost.example.com"));
        assert!(config.master.sudo);
        assert!(config.master.debug_commands);
        assert_eq!(config.master.iocage, "/usr/local/sbin/iocage");

        let foo = &config.jails["foo"];
        assert_eq!(foo.ip, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(foo.tag("foo"), "foo_prod");
        assert_eq!(foo.jailtype.as_deref(), Some("basejail"));
        assert!(foo.no_terminate);
        assert_eq!(foo.mounts.len(), 1);
        assert_eq!(foo.mounts[0].src.as_deref(), Some("{zfs[backup]}/{tag}"));

        let backup = &config.zfs["backup"];
        assert!(backup.create);
        assert_eq!(
            backup.set_properties().collect::<Vec<_>>(),
            vec![("compression", "lz4")]
        );
    }

    #[test]
    fn test_tag_defaults_to_name() {
        let jail = JailDef::default();
        assert_eq!(jail.tag("foo"), "foo");
    }

    #[test]
    fn test_validate_rejects_bad_tag() {
        let config: Config = toml::from_str(
            r#"
            [jails."foo-bar"]
            ip = "10.0.0.1"
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid instance tag 'foo-bar'"));
    }

    #[test]
    fn test_parse_bool_values() {
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("On"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
