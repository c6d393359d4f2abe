//! Core and database configuration.

use std::path::PathBuf;

/// Configuration for the mapping and transaction layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Panic instead of returning `CrossTransactionAccess` when a proxy is
    /// used from the wrong transaction.
    pub strict_transaction_checks: bool,

    /// Check values against the declared attribute type on encode and decode.
    pub validate_attribute_types: bool,

    /// Maximum depth of cascading deletes.
    pub max_cascade_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            strict_transaction_checks: cfg!(debug_assertions),
            validate_attribute_types: true,
            max_cascade_depth: 32,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether cross-transaction access panics.
    #[must_use]
    pub const fn strict_transaction_checks(mut self, value: bool) -> Self {
        self.strict_transaction_checks = value;
        self
    }

    /// Sets whether attribute values are type-checked.
    #[must_use]
    pub const fn validate_attribute_types(mut self, value: bool) -> Self {
        self.validate_attribute_types = value;
        self
    }

    /// Sets the maximum cascade depth.
    #[must_use]
    pub const fn max_cascade_depth(mut self, depth: usize) -> Self {
        self.max_cascade_depth = depth;
        self
    }
}

/// Description of a database, reported by `Database::configuration`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfiguration {
    /// Human-readable database name.
    pub name: String,

    /// Location of persistent data, if any.
    pub location: Option<PathBuf>,

    /// Whether the database refuses writes.
    pub read_only: bool,
}

impl Default for DatabaseConfiguration {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            location: None,
            read_only: false,
        }
    }
}

impl DatabaseConfiguration {
    /// Creates a configuration with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the data location.
    #[must_use]
    pub fn location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Sets read-only mode.
    #[must_use]
    pub const fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = Config::new()
            .strict_transaction_checks(false)
            .max_cascade_depth(4);
        assert!(!config.strict_transaction_checks);
        assert!(config.validate_attribute_types);
        assert_eq!(config.max_cascade_depth, 4);
    }

    #[test]
    fn database_configuration_builder() {
        let config = DatabaseConfiguration::new("library")
            .location("/tmp/library")
            .read_only(true);
        assert_eq!(config.name, "library");
        assert_eq!(config.location, Some(PathBuf::from("/tmp/library")));
        assert!(config.read_only);
    }
}
