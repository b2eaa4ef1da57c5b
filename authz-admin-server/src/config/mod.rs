pub(crate) use crate::config::catalog::{
    AccountSeed, CatalogConfig, DatasetConfig, ProfileConfig, RoleConfig, ScopeConfig,
};
pub(crate) use crate::config::hal::HalConfig;
use confique::Config;

pub mod catalog;
pub mod hal;

/// Environment variable naming the TOML file layered under the environment
pub const CONFIG_PATH_ENV: &str = "AUTHZ_ADMIN_CONFIG_PATH";

/// Main configuration structure for the authorization administration server
#[derive(Debug, Config, Clone)]
pub struct Settings {
    /// The port the server will listen to (default: 8000)
    #[config(env = "AUTHZ_ADMIN_PORT", default = 8000)]
    pub port: u16,

    /// Resource engine configuration
    #[config(nested)]
    pub hal: HalConfig,

    /// Roles, profiles and datasets known to the service
    #[config(nested)]
    pub catalog: CatalogConfig,
}

impl Settings {
    /// Loads the settings from `AUTHZ_ADMIN_*` environment variables, layered
    /// over the TOML file named by `AUTHZ_ADMIN_CONFIG_PATH` (default:
    /// `config.toml`). A missing file is not an error.
    pub fn new() -> Result<Self, confique::Error> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
        Self::builder().env().file(path).load()
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self {
            port: 0,
            hal: HalConfig::default(),
            catalog: CatalogConfig::for_test(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(name: &str, contents: &str) -> std::path::PathBuf {
        let file_name = format!("authz-admin-{}-{name}.toml", std::process::id());
        let path = std::env::temp_dir().join(file_name);
        let mut file = std::fs::File::create(&path).expect("Failed to create config file");
        file.write_all(contents.as_bytes())
            .expect("Failed to write config file");
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::builder()
            .file("/nonexistent/authz-admin/config.toml")
            .load()
            .unwrap();
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.hal.max_query_depth, 3);
        assert_eq!(settings.hal.json_chunk_size, 1024 * 1024);
        assert!(!settings.hal.allow_nan);
        assert!(!settings.hal.restate_default_query);
        assert!(settings.catalog.roles.is_empty());
        assert!(settings.catalog.required_accounts.is_empty());
    }

    #[test]
    fn test_load_catalog_from_file() {
        let path = write_config(
            "catalog",
            r#"
port = 9000

[hal]
max_query_depth = 5

[[catalog.datasets]]
id = "HR"
name = "Handelsregister"

[[catalog.datasets.scopes]]
id = "R"
name = "Read"

[[catalog.profiles]]
id = "hr_read"
name = "Read HR"
scopes = ["HR/R"]

[[catalog.roles]]
id = "CDE"
name = "Employee"
description = "Works here"
profiles = ["hr_read"]

[[catalog.required_accounts]]
id = "admin@example.com"
roles = ["CDE"]
"#,
        );
        let settings = Settings::builder().file(&path).load().unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.port, 9000);
        assert_eq!(settings.hal.max_query_depth, 5);
        assert_eq!(settings.catalog.roles[0].profiles, vec!["hr_read"]);
        assert_eq!(settings.catalog.datasets[0].scopes[0].id, "R");
        assert_eq!(settings.catalog.required_accounts[0].roles, vec!["CDE"]);
        assert!(settings.catalog.validate().is_ok());
    }

    #[test]
    fn test_example_config_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.toml");
        let settings = Settings::builder().file(path).load().unwrap();
        assert_eq!(settings.catalog.roles.len(), 2);
        assert_eq!(settings.catalog, CatalogConfig::for_test());
        assert!(settings.catalog.validate().is_ok());
    }
}
