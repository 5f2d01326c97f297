//! Files bundled into the binary at compile time
//!
//! The seccomp policy ships with the crate so a deployment can materialize it
//! next to the configured `POI_SECCOMP` path without a separate install step.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Bundled resources: (logical name, contents)
const BUNDLED: &[(&str, &[u8])] = &[(
    "config/seccomp.policy",
    include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/config/seccomp.policy")) as &[u8],
)];

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("unknown bundled resource: {0}")]
    NotFound(String),

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Names of all bundled resources
pub fn resource_names() -> impl Iterator<Item = &'static str> {
    BUNDLED.iter().map(|(name, _)| *name)
}

/// Look up a bundled resource by logical name
pub fn resource(name: &str) -> Option<&'static [u8]> {
    BUNDLED
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, bytes)| *bytes)
}

/// Write a bundled resource to `dst`, creating parent directories as needed
pub fn copy_resource(name: &str, dst: &Path) -> Result<(), ResourceError> {
    let bytes = resource(name).ok_or_else(|| ResourceError::NotFound(name.to_string()))?;

    if let Some(parent) = dst.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| ResourceError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    std::fs::write(dst, bytes).map_err(|source| ResourceError::Write {
        path: dst.to_path_buf(),
        source,
    })?;

    info!("Wrote bundled resource {} to {:?}", name, dst);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seccomp_policy_is_bundled() {
        let policy = resource("config/seccomp.policy").unwrap();
        assert!(!policy.is_empty());
        assert!(resource_names().any(|n| n == "config/seccomp.policy"));
    }

    #[test]
    fn test_copy_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("nested/deeper/seccomp.policy");

        copy_resource("config/seccomp.policy", &dst).unwrap();

        let written = std::fs::read(&dst).unwrap();
        assert_eq!(written, resource("config/seccomp.policy").unwrap());
    }

    #[test]
    fn test_unknown_resource() {
        let dir = tempfile::tempdir().unwrap();
        let err = copy_resource("nope.txt", &dir.path().join("x")).unwrap_err();
        assert!(matches!(err, ResourceError::NotFound(_)));
        assert!(!dir.path().join("x").exists());
    }
}
