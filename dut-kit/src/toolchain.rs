use camino::{Utf8Path, Utf8PathBuf};

use crate::Error;

/// Resolve a tool path from an environment override, falling back to the
/// configured default.
pub fn resolve(env_var: &str, default: impl Into<Utf8PathBuf>) -> Utf8PathBuf {
    match std::env::var(env_var) {
        Ok(value) if !value.is_empty() => Utf8PathBuf::from(value),
        _ => default.into(),
    }
}

/// Locate `command` the way a shell would: bare names are searched on
/// `search_path`, anything containing a separator is checked directly.
pub fn find_on_path(command: &Utf8Path, search_path: &str) -> Option<Utf8PathBuf> {
    if command.as_str().contains(std::path::MAIN_SEPARATOR) {
        return is_executable(command).then(|| command.to_owned());
    }
    for dir in std::env::split_paths(search_path) {
        let Ok(dir) = Utf8PathBuf::from_path_buf(dir) else {
            continue;
        };
        if dir.as_str().is_empty() {
            continue;
        }
        let candidate = dir.join(command);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Check that `command` resolves to an executable. Failing this check is a
/// fatal setup error; no build target may be generated after it.
pub fn require(command: &Utf8Path) -> Result<Utf8PathBuf, Error> {
    let search_path = std::env::var("PATH").unwrap_or_default();
    find_on_path(command, &search_path).ok_or_else(|| Error::ToolNotFound(command.to_owned()))
}

#[cfg(unix)]
fn is_executable(path: &Utf8Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.as_std_path()
        .metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Utf8Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn fake_tool(dir: &Utf8Path, name: &str) -> Utf8PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[test]
    fn test_bare_name_found_on_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        fake_tool(dir, "riscv64-unknown-elf-gcc");

        let search = format!("/nonexistent:{dir}");
        let found = find_on_path(Utf8Path::new("riscv64-unknown-elf-gcc"), &search).unwrap();
        assert_eq!(found, dir.join("riscv64-unknown-elf-gcc"));
    }

    #[cfg(unix)]
    #[test]
    fn test_explicit_path_checked_directly() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let tool = fake_tool(dir, "spike");

        assert_eq!(find_on_path(&tool, "").as_ref(), Some(&tool));
        assert_eq!(find_on_path(&dir.join("missing"), ""), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        std::fs::write(dir.join("notes.txt"), "not a tool").unwrap();

        assert_eq!(find_on_path(Utf8Path::new("notes.txt"), dir.as_str()), None);
    }

    #[test]
    fn test_missing_tool_reports_its_name() {
        let err = require(Utf8Path::new("definitely-not-a-real-tool-xyz")).unwrap_err();
        assert!(err.to_string().contains("definitely-not-a-real-tool-xyz"));
        assert!(err.to_string().contains("executable not found"));
    }
}
