//! Locally-trusted development certificates.
//!
//! `devca` issues TLS certificates for local development domains, signed by
//! a per-process root CA that it installs into the operating system and
//! browser trust stores. Certificate generation is driven through the host
//! `openssl` binary; every working file lives in an ephemeral registry and
//! is removed once the issuance run completes, successfully or not.
//!
//! The one-call entry point:
//!
//! ```no_run
//! let bundle = devca::certificate_for("my-app.test")?;
//! println!("{}", bundle.cert);
//! # Ok::<(), devca::Error>(())
//! ```

pub mod ca;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod fallback;
pub mod nss;
pub mod tempfiles;
pub mod trust;
pub mod types;

pub use ca::IssuanceEngine;
pub use config::{ConfigBuilder, SigningConfig};
pub use error::{Error, Result};
pub use fallback::{Operator, TerminalOperator};
pub use tempfiles::TempRegistry;
pub use trust::{StepOutcome, TrustStores};
pub use types::{CertBundle, CertFilePair, CommonName};

use std::fs;

/// Issues certificates for local development domains.
///
/// The issuer holds the caches that make repeated issuance cheap: the
/// private key and root CA from [`IssuanceEngine`] and the per-name signing
/// configurations from [`ConfigBuilder`]. Ephemeral files are cleared after
/// every call, whether it succeeds or fails.
#[derive(Debug, Default)]
pub struct CertificateIssuer {
    registry: TempRegistry,
    configs: ConfigBuilder,
    engine: IssuanceEngine,
}

impl CertificateIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issuer backed by an explicit ephemeral file registry.
    pub fn with_registry(registry: TempRegistry) -> Self {
        Self {
            registry,
            configs: ConfigBuilder::new(),
            engine: IssuanceEngine::new(),
        }
    }

    /// Issue a certificate for `domain`: generate (or reuse) the root CA,
    /// install it into the trust stores described by `stores`, sign a leaf
    /// certificate, and return all three PEM documents.
    pub fn issue(
        &mut self,
        domain: &str,
        stores: &TrustStores,
        operator: &dyn Operator,
    ) -> Result<CertBundle> {
        let common_name = CommonName::new(domain)?;
        let _cleanup = ClearGuard(&self.registry);

        let config = self.configs.build(&self.registry, &common_name)?;
        let ca = self
            .engine
            .generate_root_certificate(&self.registry, &common_name, &config)?;
        stores.install(&ca.cert_path, &common_name, operator)?;
        let leaf = self
            .engine
            .generate_signed_certificate(&self.registry, &common_name, &config, &ca)?;

        Ok(CertBundle {
            key: fs::read_to_string(&leaf.key_path)?,
            cert: fs::read_to_string(&leaf.cert_path)?,
            ca: fs::read_to_string(&ca.cert_path)?,
        })
    }
}

/// Clears the registry when the issuance scope ends, on every exit path.
struct ClearGuard<'a>(&'a TempRegistry);

impl Drop for ClearGuard<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}

/// Issue a certificate for `domain` with the host's default trust stores
/// and an interactive terminal operator.
pub fn certificate_for(domain: &str) -> Result<CertBundle> {
    CertificateIssuer::new().issue(domain, &TrustStores::default(), &TerminalOperator)
}
