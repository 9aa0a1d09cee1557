//! NSS database discovery and certificate installation.
//!
//! Firefox and Chromium-family browsers keep their own trust stores in NSS
//! certificate databases, independent of the OS store. This module locates
//! candidate databases under a profile-directory glob and inserts a root
//! certificate into each one it can reach.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;

use sysinfo::System;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::exec;
use crate::fallback::Operator;
use crate::types::CommonName;

/// NSS database format, identified by its marker file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NssDbKind {
    /// Legacy `cert8.db` databases.
    Legacy,
    /// Modern `cert9.db` databases, addressed through the `sql:` backend.
    Modern,
}

impl NssDbKind {
    /// Detect which database format a directory holds, if any.
    pub fn detect(dir: &Path) -> Option<Self> {
        if dir.join("cert8.db").exists() {
            Some(NssDbKind::Legacy)
        } else if dir.join("cert9.db").exists() {
            Some(NssDbKind::Modern)
        } else {
            None
        }
    }

    fn database_arg(&self, dir: &Path) -> String {
        match self {
            NssDbKind::Legacy => dir.display().to_string(),
            NssDbKind::Modern => format!("sql:{}", dir.display()),
        }
    }

    /// Arguments for adding `cert` to the database in `dir` as a trusted CA.
    pub fn add_args(&self, dir: &Path, cert: &Path, nickname: &str) -> Vec<String> {
        vec![
            "-A".to_string(),
            "-d".to_string(),
            self.database_arg(dir),
            "-t".to_string(),
            "C,,".to_string(),
            "-i".to_string(),
            cert.display().to_string(),
            "-n".to_string(),
            nickname.to_string(),
        ]
    }
}

/// Install `cert_path` into every NSS database matched by `dir_glob`.
///
/// Fails as a whole only when no NSS tool can be resolved (the caller treats
/// that as "automation impossible"). Individual directories are attempted
/// concurrently and independently: a directory without a database marker is
/// skipped silently, and a failed insertion does not affect the others.
pub fn install_into_nss(
    common_name: &CommonName,
    cert_path: &Path,
    dir_glob: &str,
    check_running_browser: Option<&str>,
    install_missing_tools: bool,
    operator: &dyn Operator,
) -> Result<()> {
    let certutil = locate_certutil(install_missing_tools)?;

    if let Some(browser) = check_running_browser {
        // A running browser holds its NSS database in memory and rewrites
        // it wholesale on exit, silently undoing any on-disk edit.
        while browser_is_running(browser) {
            operator.instruct(&format!(
                "{browser} is currently running and would overwrite the certificate database on exit."
            ));
            operator.acknowledge(&format!("Close {browser}, then press <Enter> to continue"))?;
        }
    }

    let candidates: Vec<PathBuf> = glob::glob(dir_glob)?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_dir())
        .collect();
    debug!(pattern = dir_glob, count = candidates.len(), "expanded NSS candidate directories");

    thread::scope(|scope| {
        for dir in &candidates {
            let certutil = &certutil;
            scope.spawn(move || {
                match install_into_directory(certutil, dir, cert_path, common_name) {
                    Ok(true) => info!(dir = %dir.display(), "certificate added to NSS database"),
                    Ok(false) => debug!(dir = %dir.display(), "no NSS database marker, skipped"),
                    Err(e) => debug!(dir = %dir.display(), error = %e, "NSS insertion failed"),
                }
            });
        }
    });

    Ok(())
}

fn install_into_directory(
    certutil: &Path,
    dir: &Path,
    cert_path: &Path,
    common_name: &CommonName,
) -> Result<bool> {
    let Some(kind) = NssDbKind::detect(dir) else {
        return Ok(false);
    };
    let mut command = Command::new(certutil);
    command.args(kind.add_args(dir, cert_path, common_name.as_str()));
    exec::run(command)?;
    Ok(true)
}

/// Resolve the NSS command-line certificate tool, installing its package
/// when permitted and necessary.
fn locate_certutil(install_missing_tools: bool) -> Result<PathBuf> {
    #[cfg(target_os = "macos")]
    return locate_certutil_macos(install_missing_tools);

    #[cfg(target_os = "linux")]
    return locate_certutil_linux(install_missing_tools);

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = install_missing_tools;
        Err(Error::ToolkitNotFound(
            "no NSS tool lookup on this platform".to_string(),
        ))
    }
}

#[cfg(target_os = "macos")]
fn locate_certutil_macos(install_missing_tools: bool) -> Result<PathBuf> {
    let prefix = match brew_nss_prefix() {
        Ok(prefix) => prefix,
        Err(_) if install_missing_tools => {
            let mut install = Command::new("brew");
            install.args(["install", "nss"]);
            exec::run(install)
                .map_err(|e| Error::ToolkitNotFound(format!("brew install nss: {e}")))?;
            brew_nss_prefix()?
        }
        Err(e) => return Err(e),
    };
    let certutil = PathBuf::from(prefix).join("bin").join("certutil");
    if certutil.exists() {
        Ok(certutil)
    } else {
        Err(Error::ToolkitNotFound(format!(
            "certutil not found at {}",
            certutil.display()
        )))
    }
}

#[cfg(target_os = "macos")]
fn brew_nss_prefix() -> Result<String> {
    let mut command = Command::new("brew");
    command.args(["--prefix", "nss"]);
    let output = exec::run(command)
        .map_err(|e| Error::ToolkitNotFound(format!("NSS certutil unavailable: {e}")))?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(target_os = "linux")]
fn locate_certutil_linux(install_missing_tools: bool) -> Result<PathBuf> {
    if exec::command_exists("certutil") {
        return Ok(PathBuf::from("certutil"));
    }
    if install_missing_tools {
        let mut install = Command::new("apt-get");
        install.args(["install", "-y", "libnss3-tools"]);
        exec::run(install)
            .map_err(|e| Error::ToolkitNotFound(format!("apt-get install libnss3-tools: {e}")))?;
        if exec::command_exists("certutil") {
            return Ok(PathBuf::from("certutil"));
        }
    }
    Err(Error::ToolkitNotFound(
        "NSS certutil is not installed".to_string(),
    ))
}

fn browser_is_running(name: &str) -> bool {
    let mut system = System::new_all();
    system.refresh_all();
    let needle = name.to_ascii_lowercase();
    system
        .processes()
        .values()
        .any(|p| p.name().to_string_lossy().to_ascii_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn detect_prefers_the_legacy_marker() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("cert8.db"), b"").unwrap();
        fs::write(dir.path().join("cert9.db"), b"").unwrap();
        assert_eq!(NssDbKind::detect(dir.path()), Some(NssDbKind::Legacy));
    }

    #[test]
    fn detect_finds_the_modern_marker() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("cert9.db"), b"").unwrap();
        assert_eq!(NssDbKind::detect(dir.path()), Some(NssDbKind::Modern));
    }

    #[test]
    fn detect_skips_markerless_directories() {
        let dir = TempDir::new().unwrap();
        assert_eq!(NssDbKind::detect(dir.path()), None);
    }

    #[test]
    fn legacy_invocation_addresses_the_directory_directly() {
        let args = NssDbKind::Legacy.add_args(
            Path::new("/profiles/abc"),
            Path::new("/tmp/ca.pem"),
            "foo.zoo",
        );
        assert_eq!(
            args,
            vec!["-A", "-d", "/profiles/abc", "-t", "C,,", "-i", "/tmp/ca.pem", "-n", "foo.zoo"]
        );
    }

    #[test]
    fn modern_invocation_selects_the_sql_backend() {
        let args = NssDbKind::Modern.add_args(
            Path::new("/profiles/abc"),
            Path::new("/tmp/ca.pem"),
            "foo.zoo",
        );
        assert_eq!(args[2], "sql:/profiles/abc");
    }
}
