//! Full issuance flow against the real host toolkit.
//!
//! Trust store paths are pointed at scratch directories so nothing on the
//! host machine is touched; the operator is a synthetic signal so the
//! interactive fallback completes without a terminal.

#![cfg(target_os = "linux")]

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use tempfile::TempDir;

use devca::{CertBundle, CertificateIssuer, Operator, Result, TempRegistry, TrustStores};

fn openssl_available() -> bool {
    Command::new("openssl")
        .arg("version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Operator that acknowledges every prompt immediately.
#[derive(Default)]
struct AutoOperator {
    acknowledged: AtomicUsize,
}

impl Operator for AutoOperator {
    fn instruct(&self, _message: &str) {}

    fn acknowledge(&self, _prompt: &str) -> Result<()> {
        self.acknowledged.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    _scratch: TempDir,
    work_dir: PathBuf,
    issuer: CertificateIssuer,
    stores: TrustStores,
    operator: AutoOperator,
}

fn harness() -> Harness {
    let scratch = TempDir::new().unwrap();
    let work_dir = scratch.path().join("work");
    fs::create_dir_all(&work_dir).unwrap();

    // Every trust store target is absent or empty, so the flow degrades to
    // the interactive fallback instead of touching the host.
    let stores = TrustStores {
        firefox_profile_glob: scratch
            .path()
            .join("profiles/*")
            .display()
            .to_string(),
        chromium_nssdb: scratch.path().join("nssdb"),
        system_cert_dir: scratch.path().join("absent/ssl-certs"),
        anchor_dir: scratch.path().join("absent/anchors"),
        bundle_rebuild_command: "true".to_string(),
        install_missing_tools: false,
    };

    Harness {
        issuer: CertificateIssuer::with_registry(TempRegistry::with_root(work_dir.clone())),
        _scratch: scratch,
        work_dir,
        stores,
        operator: AutoOperator::default(),
    }
}

fn issue(h: &mut Harness, domain: &str) -> CertBundle {
    let Harness {
        issuer,
        stores,
        operator,
        ..
    } = h;
    issuer.issue(domain, stores, &*operator).unwrap()
}

#[test]
fn issuance_returns_pem_documents_and_leaves_no_files_behind() {
    if !openssl_available() {
        eprintln!("openssl not found, skipping");
        return;
    }
    let mut h = harness();
    let bundle = issue(&mut h, "example.test");

    assert!(bundle.key.contains("PRIVATE KEY"));
    assert!(bundle.cert.contains("BEGIN CERTIFICATE"));
    assert!(bundle.ca.contains("BEGIN CERTIFICATE"));

    // The fallback ran at least once since no trust store was reachable.
    assert!(h.operator.acknowledged.load(Ordering::SeqCst) >= 1);

    let leftovers: Vec<_> = fs::read_dir(&h.work_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert!(leftovers.is_empty(), "leftover files: {leftovers:?}");
}

#[test]
fn repeated_issuance_reuses_the_root_ca_and_key() {
    if !openssl_available() {
        eprintln!("openssl not found, skipping");
        return;
    }
    let mut h = harness();
    let first = issue(&mut h, "example.test");
    let second = issue(&mut h, "example.test");

    assert_eq!(first.ca, second.ca);
    assert_eq!(first.key, second.key);
    // Every leaf is a fresh signing operation.
    assert_ne!(first.cert, second.cert);
}

#[test]
fn cleanup_runs_on_failed_issuance_too() {
    if !openssl_available() {
        eprintln!("openssl not found, skipping");
        return;
    }
    let mut h = harness();
    // An unreadable root certificate path cannot occur through the public
    // API, but an invalid domain fails before anything is written.
    let result = h.issuer.issue("no spaces", &h.stores, &h.operator);
    assert!(result.is_err());
    assert_eq!(fs::read_dir(&h.work_dir).unwrap().count(), 0);
}
