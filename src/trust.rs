//! Trust store installation.
//!
//! Installs a root certificate into the operating system trust store and
//! into every browser trust store it can reach. Each fallible step reports
//! an explicit outcome consumed by one per-platform dispatch; when
//! automation is impossible the flow degrades to the interactive fallback
//! instead of surfacing an error. Only an unsupported platform is fatal.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fallback::{self, Operator};
use crate::nss;
use crate::types::CommonName;

const FIREFOX_PROCESS: &str = "firefox";

/// Outcome of one installation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The certificate reached the store.
    Applied,
    /// The store is not present on this machine.
    Skipped(String),
    /// The store exists but the installation attempt failed.
    Failed(String),
}

impl StepOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, StepOutcome::Applied)
    }
}

/// Trust store targets and policies for one host.
///
/// All paths and globs are injectable so tests can point the installer at
/// scratch directories instead of the real system stores.
#[derive(Debug, Clone)]
pub struct TrustStores {
    /// Glob matching Firefox profile directories.
    pub firefox_profile_glob: String,
    /// Chromium's personal security database directory.
    pub chromium_nssdb: PathBuf,
    /// System-wide certificate directory (`/etc/ssl/certs`).
    pub system_cert_dir: PathBuf,
    /// Distribution anchor directory picked up by the bundle rebuild.
    pub anchor_dir: PathBuf,
    /// Command that rebuilds the aggregate trust bundle.
    pub bundle_rebuild_command: String,
    /// Whether the NSS tool's package may be installed when missing.
    pub install_missing_tools: bool,
}

impl Default for TrustStores {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            firefox_profile_glob: default_firefox_glob(&home),
            chromium_nssdb: home.join(".pki").join("nssdb"),
            system_cert_dir: PathBuf::from("/etc/ssl/certs"),
            anchor_dir: PathBuf::from("/usr/local/share/ca-certificates"),
            bundle_rebuild_command: "update-ca-certificates".to_string(),
            install_missing_tools: true,
        }
    }
}

impl TrustStores {
    /// Install `cert_path` into every trust store reachable on this
    /// platform, degrading to the interactive fallback where automation
    /// fails. Unsupported platforms are a hard error.
    pub fn install(
        &self,
        cert_path: &Path,
        common_name: &CommonName,
        operator: &dyn Operator,
    ) -> Result<()> {
        if !cert_path.exists() {
            return Err(Error::TrustStore(format!(
                "root certificate not found: {}",
                cert_path.display()
            )));
        }

        #[cfg(target_os = "macos")]
        return self.install_macos(cert_path, common_name, operator);

        #[cfg(target_os = "linux")]
        return self.install_linux(cert_path, common_name, operator);

        #[cfg(target_os = "windows")]
        return self.install_windows(cert_path, common_name, operator);

        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        {
            let _ = (common_name, operator);
            Err(Error::UnsupportedPlatform(std::env::consts::OS))
        }
    }

    #[cfg(target_os = "macos")]
    fn install_macos(
        &self,
        cert_path: &Path,
        common_name: &CommonName,
        operator: &dyn Operator,
    ) -> Result<()> {
        let keychain = install_macos_keychain(cert_path);
        log_outcome(&keychain, "system keychain");

        let firefox = nss::install_into_nss(
            common_name,
            cert_path,
            &self.firefox_profile_glob,
            Some(FIREFOX_PROCESS),
            self.install_missing_tools,
            operator,
        );
        if let Err(e) = &firefox {
            debug!(error = %e, "Firefox NSS installation unavailable");
        }

        if !keychain.is_applied() || firefox.is_err() {
            fallback::present_certificate(cert_path, operator)?;
        }
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn install_linux(
        &self,
        cert_path: &Path,
        common_name: &CommonName,
        operator: &dyn Operator,
    ) -> Result<()> {
        let system = self.install_linux_system(cert_path, common_name);
        log_outcome(&system, "system certificate directories");

        let firefox = nss::install_into_nss(
            common_name,
            cert_path,
            &self.firefox_profile_glob,
            Some(FIREFOX_PROCESS),
            self.install_missing_tools,
            operator,
        );
        if let Err(e) = &firefox {
            debug!(error = %e, "Firefox NSS installation unavailable");
        }

        if !system.is_applied() || firefox.is_err() {
            fallback::present_certificate(cert_path, operator)?;
        }

        // Chromium's personal security database: always attempted, never
        // interactive. If it is unreachable the target is skipped.
        let chromium_glob = self.chromium_nssdb.display().to_string();
        if let Err(e) = nss::install_into_nss(
            common_name,
            cert_path,
            &chromium_glob,
            None,
            false,
            operator,
        ) {
            debug!(error = %e, "Chromium NSS database unreachable, skipped");
        }
        Ok(())
    }

    /// Copy the certificate into both system certificate directories and
    /// rebuild the aggregate bundle.
    #[cfg(target_os = "linux")]
    fn install_linux_system(&self, cert_path: &Path, common_name: &CommonName) -> StepOutcome {
        let targets = [
            self.system_cert_dir.join(format!("{common_name}.pem")),
            self.anchor_dir.join(format!("{common_name}.crt")),
        ];
        for target in &targets {
            let parent = target.parent().unwrap_or(Path::new("/"));
            if !parent.exists() {
                return StepOutcome::Skipped(format!("{} does not exist", parent.display()));
            }
            if let Err(e) = std::fs::copy(cert_path, target) {
                return StepOutcome::Failed(format!("copy to {}: {e}", target.display()));
            }
        }
        let rebuild = std::process::Command::new(&self.bundle_rebuild_command);
        match crate::exec::run(rebuild) {
            Ok(_) => StepOutcome::Applied,
            Err(e) => StepOutcome::Failed(e.to_string()),
        }
    }

    #[cfg(target_os = "windows")]
    fn install_windows(
        &self,
        cert_path: &Path,
        common_name: &CommonName,
        operator: &dyn Operator,
    ) -> Result<()> {
        let mut command = std::process::Command::new("certutil");
        command.args(["-addstore", "-user", "root"]).arg(cert_path);
        match crate::exec::run(command) {
            Ok(_) => info!(%common_name, "certificate added to the user root store"),
            Err(e) => warn!(%common_name, error = %e, "certutil -addstore failed"),
        }
        // Firefox on Windows has no automated path; always walk the
        // operator through the import.
        fallback::present_certificate(cert_path, operator)?;
        Ok(())
    }
}

#[cfg(target_os = "macos")]
fn install_macos_keychain(cert_path: &Path) -> StepOutcome {
    let keychain = match default_keychain() {
        Some(keychain) => keychain,
        None => return StepOutcome::Skipped("no default keychain".to_string()),
    };
    let mut command = std::process::Command::new("security");
    command
        .args(["add-trusted-cert", "-r", "trustRoot", "-p", "ssl", "-p", "basic", "-k"])
        .arg(&keychain)
        .arg(cert_path);
    match crate::exec::run(command) {
        Ok(_) => StepOutcome::Applied,
        Err(e) => StepOutcome::Failed(e.to_string()),
    }
}

#[cfg(target_os = "macos")]
fn default_keychain() -> Option<String> {
    let mut command = std::process::Command::new("security");
    command.arg("default-keychain");
    if let Ok(output) = crate::exec::run(command) {
        let keychain = String::from_utf8_lossy(&output.stdout)
            .trim()
            .trim_matches('"')
            .to_string();
        if !keychain.is_empty() {
            return Some(keychain);
        }
    }
    let login = dirs::home_dir()?.join("Library/Keychains/login.keychain-db");
    login.exists().then(|| login.display().to_string())
}

fn log_outcome(outcome: &StepOutcome, store: &str) {
    match outcome {
        StepOutcome::Applied => info!(store, "root certificate installed"),
        StepOutcome::Skipped(reason) => debug!(store, reason = %reason, "trust store skipped"),
        StepOutcome::Failed(reason) => warn!(store, reason = %reason, "trust store installation failed"),
    }
}

fn default_firefox_glob(home: &Path) -> String {
    #[cfg(target_os = "macos")]
    return home
        .join("Library/Application Support/Firefox/Profiles/*")
        .display()
        .to_string();

    #[cfg(target_os = "windows")]
    return home
        .join("AppData/Roaming/Mozilla/Firefox/Profiles/*")
        .display()
        .to_string();

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    home.join(".mozilla/firefox/*").display().to_string()
}
