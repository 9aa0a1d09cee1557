//! PKI configuration builder.
//!
//! Materializes the artifacts the signing toolkit needs for one common name:
//! a policy document, an empty issuance ledger and a randomly seeded serial
//! counter. Configurations are cached per common name, so repeated requests
//! reuse the same underlying files.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::debug;

use crate::error::Result;
use crate::tempfiles::TempRegistry;
use crate::types::CommonName;

/// Validity applied to both the root and leaf certificates, in days.
pub const VALIDITY_DAYS: u32 = 7000;

/// Signing configuration for one common name.
#[derive(Debug, Clone)]
pub struct SigningConfig {
    pub common_name: CommonName,
    /// Policy document handed to the toolkit via `-config`.
    pub config_path: PathBuf,
    /// Issuance ledger managed by the toolkit (starts empty).
    pub database_path: PathBuf,
    /// Monotonic serial counter seed.
    pub serial_path: PathBuf,
}

/// Builds and caches signing configurations.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    cache: HashMap<CommonName, SigningConfig>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the signing configuration for `common_name`, writing the
    /// backing files on the first request.
    ///
    /// A cached entry is only reused while its files still exist; the
    /// registry deletes them at the end of each run, after which the
    /// configuration is rebuilt.
    pub fn build(
        &mut self,
        registry: &TempRegistry,
        common_name: &CommonName,
    ) -> Result<SigningConfig> {
        if let Some(config) = self.cache.get(common_name) {
            if config.config_path.exists() {
                debug!(%common_name, "reusing cached signing configuration");
                return Ok(config.clone());
            }
        }

        let config_path = registry.allocate(&format!("{common_name}.cnf"));
        let database_path = registry.allocate("index.txt");
        let serial_path = registry.allocate("serial");

        let document = policy_document(common_name, &database_path, &serial_path);
        fs::write(&config_path, host_line_endings(document))?;
        fs::write(&database_path, "")?;
        fs::write(&serial_path, format!("{}\n", random_serial_seed()))?;

        // The toolkit rewrites the ledger and serial through rename cycles;
        // its bookkeeping copies land next to the originals.
        for sidecar in [
            format!("{}.attr", database_path.display()),
            format!("{}.old", database_path.display()),
            format!("{}.attr.old", database_path.display()),
            format!("{}.old", serial_path.display()),
            format!("{}.new", serial_path.display()),
        ] {
            registry.adopt(PathBuf::from(sidecar));
        }

        let config = SigningConfig {
            common_name: common_name.clone(),
            config_path,
            database_path,
            serial_path,
        };
        self.cache.insert(common_name.clone(), config.clone());
        Ok(config)
    }
}

fn policy_document(common_name: &CommonName, database: &Path, serial: &Path) -> String {
    let database = cnf_escape(database);
    let serial = cnf_escape(serial);
    format!(
        r#"[ ca ]
default_ca = CA_default

[ CA_default ]
database        = {database}
serial          = {serial}
default_days    = {VALIDITY_DAYS}
default_md      = sha256
policy          = policy_loose
copy_extensions = copy
unique_subject  = no

[ policy_loose ]
commonName = supplied

[ req ]
prompt             = no
distinguished_name = req_distinguished_name
x509_extensions    = v3_ca

[ req_distinguished_name ]
commonName = {common_name}

[ v3_ca ]
basicConstraints     = critical, CA:TRUE
keyUsage             = critical, keyCertSign, cRLSign
subjectKeyIdentifier = hash

[ server_cert ]
basicConstraints = CA:FALSE
nsCertType       = server
keyUsage         = critical, digitalSignature, keyEncipherment
extendedKeyUsage = serverAuth
subjectAltName   = @alt_names

[ alt_names ]
DNS.1 = {common_name}
DNS.2 = *.{common_name}
DNS.3 = localhost
DNS.4 = localhost.localdomain
IP.1  = 127.0.0.1
IP.2  = ::1
"#
    )
}

/// Backslashes are escape characters in the policy-file dialect.
fn cnf_escape(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "\\\\")
}

fn host_line_endings(document: String) -> String {
    if cfg!(windows) {
        document.replace('\n', "\r\n")
    } else {
        document
    }
}

fn random_serial_seed() -> String {
    let mut bytes: [u8; 8] = rand::rng().random();
    // Keep the leading bit clear so the seed parses as a positive serial.
    bytes[0] &= 0x7f;
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn build_for(cn: &str) -> (TempDir, SigningConfig) {
        let dir = TempDir::new().unwrap();
        let registry = TempRegistry::with_root(dir.path().to_path_buf());
        let cn = CommonName::new(cn).unwrap();
        let config = ConfigBuilder::new().build(&registry, &cn).unwrap();
        (dir, config)
    }

    #[test]
    fn policy_document_lists_the_requested_name() {
        let (_dir, config) = build_for("foo.zoo");
        let document = fs::read_to_string(&config.config_path).unwrap();
        assert!(document.contains("DNS.1 = foo.zoo"));
        assert!(document.contains("DNS.2 = *.foo.zoo"));
        assert!(document.contains("DNS.3 = localhost"));
        assert!(document.contains("IP.2  = ::1"));
        assert!(document.contains("commonName = foo.zoo"));
    }

    #[test]
    fn ledger_starts_empty_and_serial_is_hexadecimal() {
        let (_dir, config) = build_for("foo.zoo");
        assert_eq!(fs::read_to_string(&config.database_path).unwrap(), "");

        let serial = fs::read_to_string(&config.serial_path).unwrap();
        let serial = serial.trim();
        assert_eq!(serial.len(), 16);
        assert!(serial.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn repeated_requests_return_the_cached_configuration() {
        let dir = TempDir::new().unwrap();
        let registry = TempRegistry::with_root(dir.path().to_path_buf());
        let cn = CommonName::new("foo.zoo").unwrap();
        let mut builder = ConfigBuilder::new();

        let first = builder.build(&registry, &cn).unwrap();
        let second = builder.build(&registry, &cn).unwrap();
        assert_eq!(first.config_path, second.config_path);
        assert_eq!(first.serial_path, second.serial_path);
    }

    #[test]
    fn configuration_is_rebuilt_after_cleanup() {
        let dir = TempDir::new().unwrap();
        let registry = TempRegistry::with_root(dir.path().to_path_buf());
        let cn = CommonName::new("foo.zoo").unwrap();
        let mut builder = ConfigBuilder::new();

        let first = builder.build(&registry, &cn).unwrap();
        registry.clear();
        let second = builder.build(&registry, &cn).unwrap();
        assert_ne!(first.config_path, second.config_path);
        assert!(second.config_path.exists());
    }

    #[test]
    fn path_escaping_doubles_backslashes() {
        assert_eq!(cnf_escape(Path::new("C:\\tmp\\serial")), "C:\\\\tmp\\\\serial");
    }
}
