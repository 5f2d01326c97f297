//! Test fixtures: stand-in executables for nsjail and versioned tools

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::sandbox::SandboxConfig;

/// Skips every flag up to `--`, then execs the target command in place
const FAKE_NSJAIL: &str = r#"#!/bin/sh
while [ "$#" -gt 0 ]; do
    if [ "$1" = "--" ]; then
        shift
        exec "$@"
    fi
    shift
done
echo "fake nsjail: missing separator" >&2
exit 255
"#;

/// Leading blank line and padding around the version line
const FAKE_VERSIONED: &str = "#!/bin/sh\nprintf '\\n  fakever 1.2.3  \\nbuilt yesterday\\n'\n";

static TOOL_DIR: OnceLock<tempfile::TempDir> = OnceLock::new();

fn write_executable(path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Directory holding the fake tools, written once per test binary
pub fn tool_dir() -> &'static Path {
    TOOL_DIR
        .get_or_init(|| {
            let dir = tempfile::tempdir().unwrap();
            write_executable(&dir.path().join("nsjail"), FAKE_NSJAIL);
            write_executable(&dir.path().join("fakever"), FAKE_VERSIONED);
            write_executable(&dir.path().join("failver"), "#!/bin/sh\necho v9 ; exit 1\n");
            dir
        })
        .path()
}

pub fn tool_path(name: &str) -> PathBuf {
    tool_dir().join(name)
}

/// Default config whose search path only contains the fake nsjail
pub fn config() -> SandboxConfig {
    SandboxConfig {
        search_path: vec![tool_dir().to_path_buf()],
        ..SandboxConfig::default()
    }
}
