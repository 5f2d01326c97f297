//! Sandbox configuration
//!
//! `SandboxOverrides` holds raw, unparsed values as they arrive from the
//! environment or a TOML file. `SandboxConfig::build` resolves them against
//! fixed defaults into an immutable configuration. Building is pure: the
//! environment is only read by `SandboxOverrides::from_env`.

use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::core::Failure;

pub const ENV_SEARCH_PATH: &str = "POI_NSJAIL_PATH";
pub const ENV_SECCOMP: &str = "POI_SECCOMP";
pub const ENV_RLIMIT_AS_MB: &str = "POI_RLIMIT_AS_MB";
pub const ENV_RLIMIT_CPU_S: &str = "POI_RLIMIT_CPU_S";
pub const ENV_RLIMIT_FSIZE_BYTES: &str = "POI_RLIMIT_FSIZE_BYTES";
pub const ENV_TIMEOUT_S: &str = "POI_SANDBOX_TIMEOUT_S";
pub const ENV_MAX_OUTPUT_BYTES: &str = "POI_MAX_OUTPUT_BYTES";
pub const ENV_RETRYABLE_EXIT_CODES: &str = "POI_RETRYABLE_EXIT_CODES";

pub const DEFAULT_TOOL: &str = "nsjail";
pub const DEFAULT_SEARCH_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
pub const DEFAULT_SECCOMP_POLICY: &str = "config/seccomp.policy";
pub const DEFAULT_RLIMIT_AS_MB: u64 = 4096;
pub const DEFAULT_RLIMIT_CPU_S: u64 = 600;
pub const DEFAULT_RLIMIT_FSIZE_BYTES: u64 = 524_288_000;
pub const DEFAULT_TIMEOUT_S: u64 = 600;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 16 * 1024 * 1024;

/// Directories bind-mounted read-only inside the jail
pub const READONLY_BINDS: [&str; 4] = ["/usr", "/bin", "/lib", "/lib64"];

/// TOML keys and the environment variables they mirror
const TOML_KEYS: [(&str, &str); 8] = [
    ("search_path", ENV_SEARCH_PATH),
    ("seccomp_policy", ENV_SECCOMP),
    ("rlimit_as_mb", ENV_RLIMIT_AS_MB),
    ("rlimit_cpu_s", ENV_RLIMIT_CPU_S),
    ("rlimit_fsize_bytes", ENV_RLIMIT_FSIZE_BYTES),
    ("timeout_s", ENV_TIMEOUT_S),
    ("max_output_bytes", ENV_MAX_OUTPUT_BYTES),
    ("retryable_exit_codes", ENV_RETRYABLE_EXIT_CODES),
];

/// Raw configuration overrides; `None` means "use the default"
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SandboxOverrides {
    pub search_path: Option<String>,
    pub seccomp_policy: Option<String>,
    pub rlimit_as_mb: Option<String>,
    pub rlimit_cpu_s: Option<String>,
    pub rlimit_fsize_bytes: Option<String>,
    pub timeout_s: Option<String>,
    pub max_output_bytes: Option<String>,
    pub retryable_exit_codes: Option<String>,
}

impl SandboxOverrides {
    /// Read overrides from the process environment.
    ///
    /// When `POI_NSJAIL_PATH` is unset the current `PATH` is captured instead,
    /// so the executor never consults the environment itself.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            search_path: lookup(ENV_SEARCH_PATH).or_else(|| lookup("PATH")),
            seccomp_policy: lookup(ENV_SECCOMP),
            rlimit_as_mb: lookup(ENV_RLIMIT_AS_MB),
            rlimit_cpu_s: lookup(ENV_RLIMIT_CPU_S),
            rlimit_fsize_bytes: lookup(ENV_RLIMIT_FSIZE_BYTES),
            timeout_s: lookup(ENV_TIMEOUT_S),
            max_output_bytes: lookup(ENV_MAX_OUTPUT_BYTES),
            retryable_exit_codes: lookup(ENV_RETRYABLE_EXIT_CODES),
        }
    }

    /// Parse overrides from a TOML document.
    ///
    /// Numbers may be written as integers or strings; `retryable_exit_codes`
    /// may be an integer array or a comma separated string.
    pub fn from_toml_str(content: &str) -> Result<Self, Failure> {
        let table: toml::Table = content.parse().map_err(|e: toml::de::Error| {
            Failure::config(format!("invalid sandbox config file: {}", e.message()))
        })?;

        let mut overrides = Self::default();
        for (key, value) in &table {
            let env_key = env_key_for(key).ok_or_else(|| {
                Failure::config(format!("unknown sandbox config key: {}", key))
                    .with_evidence("key", key.as_str())
            })?;
            let raw = toml_value_to_raw(env_key, value)?;
            match key.as_str() {
                "search_path" => overrides.search_path = Some(raw),
                "seccomp_policy" => overrides.seccomp_policy = Some(raw),
                "rlimit_as_mb" => overrides.rlimit_as_mb = Some(raw),
                "rlimit_cpu_s" => overrides.rlimit_cpu_s = Some(raw),
                "rlimit_fsize_bytes" => overrides.rlimit_fsize_bytes = Some(raw),
                "timeout_s" => overrides.timeout_s = Some(raw),
                "max_output_bytes" => overrides.max_output_bytes = Some(raw),
                // only "retryable_exit_codes" is left after env_key_for
                _ => overrides.retryable_exit_codes = Some(raw),
            }
        }

        Ok(overrides)
    }

    /// Layer `other` on top of `self`; values present in `other` win
    pub fn merge(self, other: SandboxOverrides) -> Self {
        Self {
            search_path: other.search_path.or(self.search_path),
            seccomp_policy: other.seccomp_policy.or(self.seccomp_policy),
            rlimit_as_mb: other.rlimit_as_mb.or(self.rlimit_as_mb),
            rlimit_cpu_s: other.rlimit_cpu_s.or(self.rlimit_cpu_s),
            rlimit_fsize_bytes: other.rlimit_fsize_bytes.or(self.rlimit_fsize_bytes),
            timeout_s: other.timeout_s.or(self.timeout_s),
            max_output_bytes: other.max_output_bytes.or(self.max_output_bytes),
            retryable_exit_codes: other.retryable_exit_codes.or(self.retryable_exit_codes),
        }
    }
}

fn toml_value_to_raw(key: &str, value: &toml::Value) -> Result<String, Failure> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                toml::Value::Integer(i) => Ok(i.to_string()),
                other => Err(invalid_value(key, &other.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|parts| parts.join(",")),
        other => Err(invalid_value(key, &other.to_string())),
    }
}

/// rlimits applied to the sandboxed command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceLimits {
    /// Address space in MiB
    pub address_space_mb: u64,
    /// CPU time in seconds
    pub cpu_secs: u64,
    /// Maximum file size in bytes
    pub file_size_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            address_space_mb: DEFAULT_RLIMIT_AS_MB,
            cpu_secs: DEFAULT_RLIMIT_CPU_S,
            file_size_bytes: DEFAULT_RLIMIT_FSIZE_BYTES,
        }
    }
}

/// Fully resolved sandbox configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SandboxConfig {
    /// Name of the isolation tool binary
    pub tool_name: String,
    /// Directories searched for the isolation tool, in order
    pub search_path: Vec<PathBuf>,
    /// New network namespace with no interfaces, not even loopback
    pub isolate_network: bool,
    pub chroot: PathBuf,
    pub cwd: PathBuf,
    pub disable_proc: bool,
    pub seccomp_policy: PathBuf,
    pub readonly_binds: Vec<PathBuf>,
    pub limits: ResourceLimits,
    /// Wall-clock timeout for the whole invocation
    pub timeout: Duration,
    /// Capture bound for each of stdout and stderr
    pub max_output_bytes: usize,
    /// Exit codes reported as retryable instead of a hard failure
    pub retryable_exit_codes: Vec<i32>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            tool_name: DEFAULT_TOOL.to_string(),
            search_path: std::env::split_paths(DEFAULT_SEARCH_PATH).collect(),
            isolate_network: true,
            chroot: PathBuf::from("/"),
            cwd: PathBuf::from("/"),
            disable_proc: true,
            seccomp_policy: PathBuf::from(DEFAULT_SECCOMP_POLICY),
            readonly_binds: READONLY_BINDS.iter().map(PathBuf::from).collect(),
            limits: ResourceLimits::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_S),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            retryable_exit_codes: Vec::new(),
        }
    }
}

impl SandboxConfig {
    /// Resolve overrides against the defaults.
    ///
    /// Fails with `E_CONFIG` when a value cannot be parsed, a limit is zero,
    /// or a path is empty. Paths are stored as given: the tool is located by
    /// `jail::resolve_tool` at run time and the policy file is read by nsjail,
    /// so building touches neither the filesystem nor the environment.
    pub fn build(overrides: &SandboxOverrides) -> Result<Self, Failure> {
        let defaults = Self::default();

        let search_path = match overrides.search_path.as_deref() {
            Some(raw) => {
                let dirs: Vec<PathBuf> = std::env::split_paths(raw)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect();
                if dirs.is_empty() {
                    return Err(invalid_value(ENV_SEARCH_PATH, raw));
                }
                dirs
            }
            None => defaults.search_path,
        };

        let seccomp_policy = match overrides.seccomp_policy.as_deref() {
            Some(raw) if raw.trim().is_empty() => return Err(invalid_value(ENV_SECCOMP, raw)),
            Some(raw) => PathBuf::from(raw),
            None => defaults.seccomp_policy,
        };

        let limits = ResourceLimits {
            address_space_mb: parse_positive(
                ENV_RLIMIT_AS_MB,
                overrides.rlimit_as_mb.as_deref(),
                DEFAULT_RLIMIT_AS_MB,
            )?,
            cpu_secs: parse_positive(
                ENV_RLIMIT_CPU_S,
                overrides.rlimit_cpu_s.as_deref(),
                DEFAULT_RLIMIT_CPU_S,
            )?,
            file_size_bytes: parse_positive(
                ENV_RLIMIT_FSIZE_BYTES,
                overrides.rlimit_fsize_bytes.as_deref(),
                DEFAULT_RLIMIT_FSIZE_BYTES,
            )?,
        };

        let timeout_s = parse_positive(
            ENV_TIMEOUT_S,
            overrides.timeout_s.as_deref(),
            DEFAULT_TIMEOUT_S,
        )?;

        let max_output_bytes = parse_positive(
            ENV_MAX_OUTPUT_BYTES,
            overrides.max_output_bytes.as_deref(),
            DEFAULT_MAX_OUTPUT_BYTES,
        )?;

        let retryable_exit_codes = match overrides.retryable_exit_codes.as_deref() {
            Some(raw) => parse_exit_codes(raw)?,
            None => defaults.retryable_exit_codes,
        };

        Ok(Self {
            search_path,
            seccomp_policy,
            limits,
            timeout: Duration::from_secs(timeout_s),
            max_output_bytes,
            retryable_exit_codes,
            ..defaults
        })
    }

    /// Copy of this config with a different wall-clock timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn invalid_value(key: &str, raw: &str) -> Failure {
    Failure::config(format!("invalid value for {}: {:?}", key, raw))
        .with_evidence("key", key)
        .with_evidence("value", raw)
}

fn parse_positive<T>(key: &str, raw: Option<&str>, default: T) -> Result<T, Failure>
where
    T: FromStr + Default + PartialEq,
{
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value != T::default() => Ok(value),
        _ => Err(invalid_value(key, raw)),
    }
}

fn parse_exit_codes(raw: &str) -> Result<Vec<i32>, Failure> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i32>()
                .map_err(|_| invalid_value(ENV_RETRYABLE_EXIT_CODES, raw))
        })
        .collect()
}

/// The environment variable backing a TOML key, if any
pub fn env_key_for(toml_key: &str) -> Option<&'static str> {
    TOML_KEYS
        .iter()
        .find(|(k, _)| *k == toml_key)
        .map(|(_, env)| *env)
}
