//! Shared buffer mirroring the raw bytes of an SMTP session.

use std::{fmt, sync::Arc};

use parking_lot::Mutex;

/// Cheaply clonable handle to a session transcript. Every clone appends to,
/// and reads from, the same buffer.
#[derive(Clone, Default)]
pub struct Transcript {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, data: &[u8]) {
        self.inner.lock().extend_from_slice(data);
    }

    /// Copy of everything recorded so far.
    pub fn contents(&self) -> Vec<u8> {
        self.inner.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.inner.lock()))
    }
}

impl fmt::Debug for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transcript")
            .field("len", &self.inner.lock().len())
            .finish()
    }
}
