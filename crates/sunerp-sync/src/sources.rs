//! Data source catalog
//!
//! Built-in defaults merged with an optional JSON file. Entries in the file
//! replace defaults of the same name and append otherwise. The catalog is
//! read-only once built.

use std::path::Path;

use sunerp_common::types::{Capability, DataSourceConfig, DataSourceType};
use tracing::{info, warn};

use crate::error::Result;

/// Immutable list of configured data sources
#[derive(Debug, Clone, Default)]
pub struct DataSourceCatalog {
    sources: Vec<DataSourceConfig>,
}

impl DataSourceCatalog {
    /// Build a catalog; later entries replace earlier ones with the same name
    pub fn new(sources: impl IntoIterator<Item = DataSourceConfig>) -> Self {
        let mut catalog = Self::default();
        catalog.merge(sources);
        catalog
    }

    pub fn with_defaults() -> Self {
        Self::new(default_data_sources())
    }

    /// Defaults merged with the file at `path`
    ///
    /// A missing or malformed file is logged and the defaults are used.
    pub fn load(path: &Path) -> Self {
        let mut catalog = Self::with_defaults();

        if !path.exists() {
            warn!(path = %path.display(), "Data source file not found, using built-in defaults");
            return catalog;
        }

        match read_sources_file(path) {
            Ok(overrides) => {
                info!(path = %path.display(), count = overrides.len(), "Loaded data source overrides");
                catalog.merge(overrides);
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not parse data source file, using built-in defaults");
            },
        }

        catalog
    }

    pub fn get(&self, name: &str) -> Option<&DataSourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    pub fn list(&self) -> &[DataSourceConfig] {
        &self.sources
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name.as_str()).collect()
    }

    fn merge(&mut self, sources: impl IntoIterator<Item = DataSourceConfig>) {
        for source in sources {
            match self.sources.iter_mut().find(|s| s.name == source.name) {
                Some(existing) => *existing = source,
                None => self.sources.push(source),
            }
        }
    }
}

fn read_sources_file(path: &Path) -> Result<Vec<DataSourceConfig>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Sources every deployment starts with
pub fn default_data_sources() -> Vec<DataSourceConfig> {
    vec![
        DataSourceConfig::new("erp-database", DataSourceType::InternalDb)
            .with_capabilities([Capability::Read, Capability::Metadata])
            .with_option("table", "projects")
            .with_schedule("0 */2 * * *", "Europe/Berlin"),
        DataSourceConfig::new("pv-leads-csv", DataSourceType::CsvFile)
            .with_capabilities([Capability::Read, Capability::Metadata])
            .with_option("path", "data/pv-leads.csv")
            .with_option("delimiter", ",")
            .with_schedule("0 6 * * *", "Europe/Berlin"),
        DataSourceConfig::new("external-crm", DataSourceType::ExternalApi)
            .with_capabilities([Capability::Read])
            .with_option("baseUrl", "https://crm.example.com/api")
            .disabled(),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_defaults_are_present() {
        let catalog = DataSourceCatalog::with_defaults();
        assert_eq!(catalog.names(), vec!["erp-database", "pv-leads-csv", "external-crm"]);
        assert!(!catalog.get("external-crm").unwrap().enabled);
    }

    #[test]
    fn test_file_overrides_by_name_and_appends() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let overrides = json!([
            {
                "name": "pv-leads-csv",
                "type": "csv-file",
                "capabilities": ["read"],
                "options": { "path": "/srv/import/leads.csv" }
            },
            {
                "name": "installer-partners",
                "type": "csv-file",
                "capabilities": ["read", "metadata"],
                "options": { "path": "/srv/import/partners.csv" }
            }
        ]);
        write!(file, "{overrides}").unwrap();

        let catalog = DataSourceCatalog::load(file.path());

        assert_eq!(catalog.list().len(), 4);
        let leads = catalog.get("pv-leads-csv").unwrap();
        assert_eq!(leads.options["path"], json!("/srv/import/leads.csv"));
        assert!(!leads.has_capability(Capability::Metadata));
        assert!(catalog.get("installer-partners").is_some());
        assert!(catalog.get("erp-database").is_some());
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let catalog = DataSourceCatalog::load(file.path());
        assert_eq!(catalog.list(), DataSourceCatalog::with_defaults().list());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let catalog = DataSourceCatalog::load(Path::new("/nonexistent/data-sources.json"));
        assert_eq!(catalog.list().len(), default_data_sources().len());
    }
}
