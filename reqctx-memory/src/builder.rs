//! Builder for configuring [`MapBackend`].

use crate::backend::MapBackend;

/// Builder for creating a [`MapBackend`].
///
/// Use [`MapBackend::builder`] to create one.
pub struct MapBackendBuilder {
    max_entries: Option<usize>,
    label: String,
}

impl MapBackendBuilder {
    pub(crate) fn new() -> Self {
        Self { max_entries: None, label: "memory".to_string() }
    }

    /// Caps the number of entries the backend holds; the oldest insertion
    /// is evicted once a `set` would exceed it.
    ///
    /// Unbounded by default.
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Sets a label for this backend, used in metrics.
    ///
    /// # Default
    ///
    /// `"memory"`
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Builds the [`MapBackend`].
    pub fn build(self) -> MapBackend {
        MapBackend::new(self.max_entries, self.label)
    }
}

impl Default for MapBackendBuilder {
    fn default() -> Self {
        Self::new()
    }
}
