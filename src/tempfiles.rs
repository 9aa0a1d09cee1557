//! Ephemeral file registry.
//!
//! Every PKI working file produced during an issuance run is allocated
//! through a [`TempRegistry`], which hands out collision-free paths under a
//! random per-session prefix and guarantees their removal afterwards. No PKI
//! material survives the run except what was explicitly installed into a
//! trust store or returned to the caller as text.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use rand::distr::Alphanumeric;
use rand::Rng;
use tracing::debug;

const SESSION_PREFIX_LEN: usize = 12;

/// Registry of ephemeral files for one issuance run.
///
/// Created explicitly per run and passed by reference to every component
/// that allocates or clears working files.
#[derive(Debug)]
pub struct TempRegistry {
    root: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    prefix: Option<String>,
    counts: HashMap<String, u32>,
    allocated: Vec<PathBuf>,
}

impl TempRegistry {
    /// Registry rooted at the host temporary directory.
    pub fn new() -> Self {
        Self::with_root(std::env::temp_dir())
    }

    /// Registry rooted at an explicit directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Reserve a path for `name`, unique within this registry session.
    ///
    /// The first allocation after a reset derives a fresh random session
    /// prefix. Repeated allocations of the same name get an increasing
    /// numeric suffix starting from 1, so `allocate("key")` twice yields two
    /// distinct paths. The file itself is not created here.
    pub fn allocate(&self, name: &str) -> PathBuf {
        let mut inner = self.lock();
        let prefix = inner
            .prefix
            .get_or_insert_with(session_prefix)
            .clone();
        let count = *inner
            .counts
            .entry(name.to_string())
            .and_modify(|c| *c += 1)
            .or_insert(0);
        let file_name = if count == 0 {
            format!("{prefix}-{name}")
        } else {
            format!("{prefix}-{name}-{count}")
        };
        let path = self.root.join(file_name);
        inner.allocated.push(path.clone());
        path
    }

    /// Register an externally created file for cleanup.
    ///
    /// The signing toolkit writes bookkeeping copies (`.old`, `.attr`)
    /// next to the ledger and serial files; adopting them keeps the
    /// no-leftovers guarantee intact.
    pub fn adopt(&self, path: PathBuf) {
        self.lock().allocated.push(path);
    }

    /// Delete every path ever handed out and reset to the empty state.
    ///
    /// Paths that were never created or are already gone are not failures;
    /// cleanup errors are never surfaced.
    pub fn clear(&self) {
        let previous = std::mem::take(&mut *self.lock());
        for path in previous.allocated {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(path = %path.display(), error = %e, "could not remove ephemeral file");
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TempRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn session_prefix() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(SESSION_PREFIX_LEN)
        .map(char::from)
        .collect()
}
