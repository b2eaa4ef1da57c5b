use confique::Config;
use serde::{Deserialize, Serialize};

/// The static authorization catalogue: which roles exist, which profiles
/// they grant and which dataset scopes those profiles consist of.
#[derive(Debug, Config, Clone, Default, PartialEq)]
pub struct CatalogConfig {
    /// Roles that can be assigned to accounts (default: none)
    #[config(default = [])]
    pub roles: Vec<RoleConfig>,

    /// Profiles, each a named set of scopes (default: none)
    #[config(default = [])]
    pub profiles: Vec<ProfileConfig>,

    /// Datasets and the scopes they define (default: none)
    #[config(default = [])]
    pub datasets: Vec<DatasetConfig>,

    /// Accounts that are created at start-up if they don't exist yet (default: none)
    #[config(default = [])]
    pub required_accounts: Vec<AccountSeed>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Ids of the profiles this role grants
    #[serde(default)]
    pub profiles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Scopes in `<dataset>/<scope>` notation
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub scopes: Vec<ScopeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Id of a scope in the same dataset that this scope implies
    #[serde(default)]
    pub includes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSeed {
    pub id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl CatalogConfig {
    pub fn role(&self, id: &str) -> Option<&RoleConfig> {
        self.roles.iter().find(|role| role.id == id)
    }

    pub fn profile(&self, id: &str) -> Option<&ProfileConfig> {
        self.profiles.iter().find(|profile| profile.id == id)
    }

    pub fn dataset(&self, id: &str) -> Option<&DatasetConfig> {
        self.datasets.iter().find(|dataset| dataset.id == id)
    }

    pub fn scope(&self, dataset: &str, scope: &str) -> Option<(&DatasetConfig, &ScopeConfig)> {
        let dataset = self.dataset(dataset)?;
        let scope = dataset.scopes.iter().find(|s| s.id == scope)?;
        Some((dataset, scope))
    }

    /// Roles that grant the profile `profile`, in catalogue order
    pub fn roles_with_profile<'a>(
        &'a self,
        profile: &'a str,
    ) -> impl Iterator<Item = &'a RoleConfig> {
        self.roles
            .iter()
            .filter(move |role| role.profiles.iter().any(|p| p == profile))
    }

    /// Checks that every reference in the catalogue points at an existing entry.
    pub fn validate(&self) -> Result<(), String> {
        for role in &self.roles {
            for profile in &role.profiles {
                if self.profile(profile).is_none() {
                    return Err(format!("Role {} refers to unknown profile {profile}", role.id));
                }
            }
        }
        for profile in &self.profiles {
            for scope in &profile.scopes {
                let known = split_scope(scope)
                    .and_then(|(dataset, scope)| self.scope(dataset, scope))
                    .is_some();
                if !known {
                    return Err(format!("Profile {} refers to unknown scope {scope}", profile.id));
                }
            }
        }
        for dataset in &self.datasets {
            for scope in &dataset.scopes {
                if let Some(included) = &scope.includes {
                    if self.scope(&dataset.id, included).is_none() {
                        return Err(format!(
                            "Scope {}/{} includes unknown scope {included}",
                            dataset.id, scope.id
                        ));
                    }
                }
            }
        }
        for account in &self.required_accounts {
            if let Some(role) = account.roles.iter().find(|r| self.role(r).is_none()) {
                return Err(format!("Account {} has unknown role {role}", account.id));
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        let scope = |id: &str, name: &str, includes: Option<&str>| ScopeConfig {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            includes: includes.map(str::to_string),
        };
        Self {
            roles: vec![
                RoleConfig {
                    id: "CDE".to_string(),
                    name: "Medewerker".to_string(),
                    description: Some("Employee of the city".to_string()),
                    profiles: vec!["hr_read".to_string()],
                },
                RoleConfig {
                    id: "CDE_PLUS".to_string(),
                    name: "Medewerker plus".to_string(),
                    description: None,
                    profiles: vec!["hr_read".to_string(), "hr_write".to_string()],
                },
            ],
            profiles: vec![
                ProfileConfig {
                    id: "hr_read".to_string(),
                    name: "Read HR".to_string(),
                    description: None,
                    scopes: vec!["HR/R".to_string()],
                },
                ProfileConfig {
                    id: "hr_write".to_string(),
                    name: "Write HR".to_string(),
                    description: None,
                    scopes: vec!["HR/W".to_string()],
                },
            ],
            datasets: vec![DatasetConfig {
                id: "HR".to_string(),
                name: "Handelsregister".to_string(),
                description: Some("Chamber of commerce".to_string()),
                scopes: vec![scope("R", "Read", None), scope("W", "Write", Some("R"))],
            }],
            required_accounts: vec![AccountSeed {
                id: "p.van.beek@amsterdam.nl".to_string(),
                roles: vec!["CDE".to_string(), "CDE_PLUS".to_string()],
            }],
        }
    }
}

/// Splits `<dataset>/<scope>` notation.
pub fn split_scope(scope: &str) -> Option<(&str, &str)> {
    scope.split_once('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let catalog = CatalogConfig::for_test();
        assert_eq!(catalog.role("CDE").unwrap().name, "Medewerker");
        assert!(catalog.role("nope").is_none());
        let (dataset, scope) = catalog.scope("HR", "W").unwrap();
        assert_eq!(dataset.name, "Handelsregister");
        assert_eq!(scope.includes.as_deref(), Some("R"));
        let roles: Vec<_> = catalog
            .roles_with_profile("hr_write")
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(roles, vec!["CDE_PLUS"]);
    }

    #[test]
    fn test_validate_dangling_references() {
        assert!(CatalogConfig::for_test().validate().is_ok());

        let mut catalog = CatalogConfig::for_test();
        catalog.roles[0].profiles.push("missing".to_string());
        assert!(catalog.validate().unwrap_err().contains("unknown profile missing"));

        let mut catalog = CatalogConfig::for_test();
        catalog.profiles[0].scopes = vec!["HR".to_string()];
        assert!(catalog.validate().unwrap_err().contains("unknown scope HR"));

        let mut catalog = CatalogConfig::for_test();
        catalog.required_accounts[0].roles.push("GHOST".to_string());
        assert!(catalog.validate().is_err());
    }
}
