//! nsjail invocation
//!
//! Translates a `SandboxConfig` into nsjail command-line flags and locates
//! the nsjail binary on the configured search path.

use std::ffi::OsString;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::config::SandboxConfig;

/// Separator between nsjail flags and the target command
pub const ARG_SEPARATOR: &str = "--";

/// Locate the isolation tool in the configured search path.
///
/// A tool name containing a slash is treated as a path and checked directly.
pub fn resolve_tool(config: &SandboxConfig) -> Option<PathBuf> {
    let name = Path::new(&config.tool_name);
    if config.tool_name.contains('/') {
        return is_executable(name).then(|| name.to_path_buf());
    }

    let found = config
        .search_path
        .iter()
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate));

    debug!("Resolved {} to {:?}", config.tool_name, found);
    found
}

fn is_executable(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// nsjail flags derived from the config, without the target command
pub fn jail_flags(config: &SandboxConfig) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--quiet".into()];

    if config.isolate_network {
        args.push("--clone_newnet".into());
        args.push("--iface_no_lo".into());
    }

    args.push("--chroot".into());
    args.push(config.chroot.clone().into_os_string());
    args.push("--cwd".into());
    args.push(config.cwd.clone().into_os_string());

    if config.disable_proc {
        args.push("--disable_proc".into());
    }

    args.push("--seccomp_policy".into());
    args.push(config.seccomp_policy.clone().into_os_string());

    for dir in &config.readonly_binds {
        args.push("--bindmount_ro".into());
        args.push(dir.clone().into_os_string());
    }

    args.extend([
        "--rlimit_as".into(),
        config.limits.address_space_mb.to_string().into(),
        "--rlimit_cpu".into(),
        config.limits.cpu_secs.to_string().into(),
        "--rlimit_fsize".into(),
        config.limits.file_size_bytes.to_string().into(),
    ]);

    args
}

/// Full argument list: flags, separator, then `argv` untouched
pub fn build_args(config: &SandboxConfig, argv: &[String]) -> Vec<OsString> {
    let mut args = jail_flags(config);
    args.push(ARG_SEPARATOR.into());
    args.extend(argv.iter().map(OsString::from));
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn as_strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_default_flags() {
        let config = SandboxConfig::default();
        let args = as_strings(&build_args(&config, &["echo".into(), "hi".into()]));

        let expected: Vec<String> = [
            "--quiet",
            "--clone_newnet",
            "--iface_no_lo",
            "--chroot",
            "/",
            "--cwd",
            "/",
            "--disable_proc",
            "--seccomp_policy",
            "config/seccomp.policy",
            "--bindmount_ro",
            "/usr",
            "--bindmount_ro",
            "/bin",
            "--bindmount_ro",
            "/lib",
            "--bindmount_ro",
            "/lib64",
            "--rlimit_as",
            "4096",
            "--rlimit_cpu",
            "600",
            "--rlimit_fsize",
            "524288000",
            "--",
            "echo",
            "hi",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        assert_eq!(args, expected);
    }

    #[test]
    fn test_argv_is_never_interpreted() {
        let config = SandboxConfig::default();
        let argv: Vec<String> = [
            "--chroot",
            "/etc",
            "--",
            "--disable_proc",
            "-Mo",
            "",
            "a b; rm -rf /",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let args = as_strings(&build_args(&config, &argv));
        let flags = jail_flags(&config);

        assert_eq!(args.len(), flags.len() + 1 + argv.len());
        assert_eq!(args[flags.len()], "--");
        assert_eq!(&args[flags.len() + 1..], argv.as_slice());
    }

    #[test]
    fn test_flags_follow_config() {
        let mut config = SandboxConfig::default();
        config.isolate_network = false;
        config.disable_proc = false;
        config.readonly_binds = vec![PathBuf::from("/opt/toolchain")];

        let args = as_strings(&jail_flags(&config));

        assert!(!args.contains(&"--clone_newnet".to_string()));
        assert!(!args.contains(&"--disable_proc".to_string()));
        assert_eq!(args.iter().filter(|a| *a == "--bindmount_ro").count(), 1);
        assert!(args.contains(&"/opt/toolchain".to_string()));
    }

    #[test]
    fn test_resolve_tool_in_search_path() {
        let empty = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("nsjail");
        let mut file = std::fs::File::create(&tool).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = SandboxConfig::default();
        config.search_path = vec![empty.path().to_path_buf(), dir.path().to_path_buf()];

        assert_eq!(resolve_tool(&config), Some(tool));
    }

    #[test]
    fn test_resolve_tool_skips_non_executable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("nsjail"), "not a program").unwrap();

        let mut config = SandboxConfig::default();
        config.search_path = vec![dir.path().to_path_buf()];

        assert_eq!(resolve_tool(&config), None);
    }
}
