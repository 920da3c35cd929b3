//! Descriptor of the mail-transfer-agent flavour a run targets.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct Mta {
    pub name: String,

    /// Feature tags passed to every program under test via `-tags`.
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(skip)]
    failed_test: AtomicBool,
}

impl Mta {
    #[must_use]
    pub fn new(name: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            name: name.into(),
            tags,
            failed_test: AtomicBool::new(false),
        }
    }

    /// Tags joined the way the `-tags` argument expects them.
    pub fn joined_tags(&self) -> String {
        self.tags.join(" ")
    }

    /// Records that a test against this MTA failed. Never reset.
    pub fn mark_failed_test(&self) {
        self.failed_test.store(true, Ordering::Release);
    }

    pub fn has_failed_test(&self) -> bool {
        self.failed_test.load(Ordering::Acquire)
    }
}
