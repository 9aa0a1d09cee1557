//! Certificate issuance engine.
//!
//! Drives the host `openssl` binary to generate the root CA and to issue
//! leaf certificates signed by it. The engine owns two explicit caches: a
//! single-slot CA record keyed by common name, and the raw private key
//! bytes, which are written to a fresh ephemeral file for every issuance so
//! the expensive key generation runs at most once per process.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use crate::config::{SigningConfig, VALIDITY_DAYS};
use crate::error::{Error, Result};
use crate::tempfiles::TempRegistry;
use crate::types::{CertFilePair, CommonName};

const KEY_BITS: u32 = 2048;

/// Cached root CA material.
///
/// Key and certificate are always stored together so a cache hit can never
/// mix material from different common names. At most one record is held;
/// generating a root for a different name evicts the previous one.
#[derive(Debug, Clone)]
pub struct CaRecord {
    common_name: CommonName,
    key: Vec<u8>,
    certificate: Vec<u8>,
}

/// Issues root and leaf certificates through the external toolkit.
#[derive(Debug, Default)]
pub struct IssuanceEngine {
    ca: Option<CaRecord>,
    key: Option<Vec<u8>>,
}

impl IssuanceEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the process private key to a fresh ephemeral file, generating
    /// it first if no key is cached yet.
    pub fn generate_key(&mut self, registry: &TempRegistry) -> Result<PathBuf> {
        let key_path = registry.allocate("private-key.pem");
        if let Some(bytes) = &self.key {
            debug!("reusing cached private key");
            fs::write(&key_path, bytes)?;
            restrict_permissions(&key_path)?;
            return Ok(key_path);
        }

        let seed = registry.allocate("rnd");
        let mut command = Command::new("openssl");
        command
            .args(["genrsa", "-out"])
            .arg(&key_path)
            .arg(KEY_BITS.to_string())
            .env("RANDFILE", &seed);
        run_toolkit(command, &key_path)?;

        self.key = Some(fs::read(&key_path)?);
        restrict_permissions(&key_path)?;
        Ok(key_path)
    }

    /// Produce the root CA key and certificate for `common_name`.
    ///
    /// A cache hit (strict common-name equality) writes the cached bytes to
    /// fresh files without invoking the toolkit; a miss runs a self-signed
    /// issuance and replaces the cached record whole.
    pub fn generate_root_certificate(
        &mut self,
        registry: &TempRegistry,
        common_name: &CommonName,
        config: &SigningConfig,
    ) -> Result<CertFilePair> {
        let cert_path = registry.allocate("certificate-authority.pem");

        if let Some(record) = self.ca.as_ref().filter(|r| r.common_name == *common_name) {
            debug!(%common_name, "root CA cache hit");
            let key_path = registry.allocate("certificate-authority-key.pem");
            fs::write(&key_path, &record.key)?;
            restrict_permissions(&key_path)?;
            fs::write(&cert_path, &record.certificate)?;
            return Ok(CertFilePair {
                key_path,
                cert_path,
            });
        }

        let key_path = self.generate_key(registry)?;
        let seed = registry.allocate("rnd");
        let mut command = Command::new("openssl");
        command
            .args(["req", "-new", "-x509", "-config"])
            .arg(&config.config_path)
            .arg("-key")
            .arg(&key_path)
            .arg("-out")
            .arg(&cert_path)
            .arg("-days")
            .arg(VALIDITY_DAYS.to_string())
            .arg("-batch")
            .env("RANDFILE", &seed);
        run_toolkit(command, &cert_path)?;

        let certificate = fs::read(&cert_path)?;
        let key = self
            .key
            .clone()
            .ok_or_else(|| Error::Issuance("private key cache empty after generation".into()))?;
        self.ca = Some(CaRecord {
            common_name: common_name.clone(),
            key,
            certificate,
        });
        info!(%common_name, "generated root CA certificate");

        Ok(CertFilePair {
            key_path,
            cert_path,
        })
    }

    /// Issue a leaf certificate for `common_name`, signed by `ca`.
    ///
    /// Leaves are never cached; every call builds a fresh signing request
    /// and performs a fresh signing operation.
    pub fn generate_signed_certificate(
        &mut self,
        registry: &TempRegistry,
        common_name: &CommonName,
        config: &SigningConfig,
        ca: &CertFilePair,
    ) -> Result<CertFilePair> {
        let key_path = self.generate_key(registry)?;

        let csr_path = registry.allocate(&format!("{common_name}.csr"));
        let seed = registry.allocate("rnd");
        let mut request = Command::new("openssl");
        request
            .args(["req", "-new", "-config"])
            .arg(&config.config_path)
            .arg("-key")
            .arg(&key_path)
            .arg("-out")
            .arg(&csr_path)
            .arg("-batch")
            .env("RANDFILE", &seed);
        run_toolkit(request, &csr_path)?;

        let cert_path = registry.allocate(&format!("{common_name}.crt"));
        // The toolkit insists on an output directory for its own copies of
        // issued certificates; the contents are unused.
        let outdir = tempfile::tempdir()?;
        let seed = registry.allocate("rnd");
        let mut sign = Command::new("openssl");
        sign.args(["ca", "-config"])
            .arg(&config.config_path)
            .arg("-in")
            .arg(&csr_path)
            .arg("-out")
            .arg(&cert_path)
            .arg("-outdir")
            .arg(outdir.path())
            .arg("-keyfile")
            .arg(&ca.key_path)
            .arg("-cert")
            .arg(&ca.cert_path)
            .args(["-notext", "-md", "sha256", "-days"])
            .arg(VALIDITY_DAYS.to_string())
            .args(["-batch", "-extensions", "server_cert"])
            .env("RANDFILE", &seed);
        run_toolkit(sign, &cert_path)?;
        info!(%common_name, "issued signed leaf certificate");

        Ok(CertFilePair {
            key_path,
            cert_path,
        })
    }
}

/// Run one toolkit invocation and verify it produced its artifact.
///
/// A non-zero exit, or a clean exit that left only diagnostic output and no
/// artifact, surfaces as an issuance failure carrying the toolkit's stderr.
/// Failures are never retried.
fn run_toolkit(mut command: Command, expected_output: &Path) -> Result<()> {
    let output = command
        .output()
        .map_err(|e| Error::ToolkitNotFound(format!("openssl: {e}")))?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(Error::Issuance(format!(
            "openssl exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    let produced = fs::metadata(expected_output)
        .map(|m| m.len() > 0)
        .unwrap_or(false);
    if !produced {
        return Err(Error::Issuance(format!(
            "openssl produced no output at {}: {}",
            expected_output.display(),
            stderr.trim()
        )));
    }
    Ok(())
}

fn restrict_permissions(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
