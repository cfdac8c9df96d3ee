//! Configuration for push runs.

/// Configuration for push runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConfig {
    /// Prefix of server-managed document properties.
    pub system_property_prefix: String,
    /// Concurrency token property, kept when results are written locally.
    pub version_property: String,
    /// Whether remote results are written back to the local store at all.
    ///
    /// Combined with each operation's own `write_result_to_store` flag.
    pub write_results: bool,
}

impl PushConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            system_property_prefix: "__".into(),
            version_property: "__version".into(),
            write_results: true,
        }
    }

    /// Sets the system property prefix.
    pub fn with_system_property_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.system_property_prefix = prefix.into();
        self
    }

    /// Sets the version property name.
    pub fn with_version_property(mut self, property: impl Into<String>) -> Self {
        self.version_property = property.into();
        self
    }

    /// Enables or disables writing remote results back locally.
    pub fn with_write_results(mut self, write: bool) -> Self {
        self.write_results = write;
        self
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self::new()
    }
}
