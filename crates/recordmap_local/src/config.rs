//! Local backend configuration.

use recordmap_core::ZoneId;

/// Configuration for a [`crate::LocalDatabase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    /// Whether every save syncs the journal to disk.
    ///
    /// Default: true
    pub sync_on_save: bool,

    /// Whether opening a missing directory creates it.
    ///
    /// Default: true
    pub create_if_missing: bool,

    /// Name of the zone records land in when none is given.
    ///
    /// Default: `_defaultZone`
    pub default_zone_name: String,

    /// Prefix prepended to entity names to form record types.
    ///
    /// Default: none (record types are entity names)
    pub record_type_prefix: Option<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            sync_on_save: true,
            create_if_missing: true,
            default_zone_name: ZoneId::DEFAULT_NAME.to_string(),
            record_type_prefix: None,
        }
    }
}

impl LocalConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether saves sync the journal.
    #[must_use]
    pub const fn sync_on_save(mut self, value: bool) -> Self {
        self.sync_on_save = value;
        self
    }

    /// Sets whether a missing directory is created.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the default zone name.
    #[must_use]
    pub fn default_zone_name(mut self, name: impl Into<String>) -> Self {
        self.default_zone_name = name.into();
        self
    }

    /// Sets the record type prefix.
    #[must_use]
    pub fn record_type_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.record_type_prefix = Some(prefix.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = LocalConfig::default();
        assert!(config.sync_on_save);
        assert!(config.create_if_missing);
        assert_eq!(config.default_zone_name, "_defaultZone");
        assert_eq!(config.record_type_prefix, None);
    }

    #[test]
    fn builder_overrides() {
        let config = LocalConfig::new()
            .sync_on_save(false)
            .create_if_missing(false)
            .default_zone_name("main")
            .record_type_prefix("CD_");
        assert!(!config.sync_on_save);
        assert!(!config.create_if_missing);
        assert_eq!(config.default_zone_name, "main");
        assert_eq!(config.record_type_prefix.as_deref(), Some("CD_"));
    }
}
