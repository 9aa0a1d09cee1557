use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// A validated domain-like name.
///
/// The common name identifies both the root CA subject and the leaf
/// certificate subject, and it is the cache key for root-CA reuse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommonName(String);

impl CommonName {
    /// Validate a requested name: 1-64 characters, no whitespace, control
    /// characters, or path separators (the name is embedded into file names
    /// and the signing policy document).
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() || name.len() > 64 {
            return Err(Error::InvalidCommonName(format!(
                "{name:?}: must be between 1 and 64 characters"
            )));
        }
        if name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '/' || c == '\\')
        {
            return Err(Error::InvalidCommonName(format!(
                "{name:?}: whitespace, control characters and path separators are not allowed"
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The on-disk result of a single issuance operation (root or leaf).
///
/// Ownership of the files is transient: the caller must read the contents
/// before the ephemeral file registry clears them.
#[derive(Debug, Clone)]
pub struct CertFilePair {
    pub key_path: PathBuf,
    pub cert_path: PathBuf,
}

/// PEM text returned to the caller after a completed issuance.
#[derive(Debug, Clone)]
pub struct CertBundle {
    /// Leaf private key.
    pub key: String,
    /// Leaf certificate.
    pub cert: String,
    /// Root CA certificate that signed the leaf.
    pub ca: String,
}
