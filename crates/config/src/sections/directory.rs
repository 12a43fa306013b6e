// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

use figment::Figment;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigurationSection;

/// Configuration related to the identity directory
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DirectoryConfig {
    /// The tenant domain of the directory, e.g. `auth.example.com`
    pub tenant: String,

    /// Client ID used for the management API token exchange
    pub client_id: String,

    /// Client secret used for the management API token exchange
    pub client_secret: String,
}

impl ConfigurationSection for DirectoryConfig {
    const PATH: Option<&'static str> = Some("directory");

    fn validate(
        &self,
        _figment: &Figment,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        if self.tenant.is_empty() {
            return Err("directory.tenant must not be empty".into());
        }

        if self.tenant.contains('/') {
            return Err("directory.tenant must be a bare domain, not a URL".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use figment::{
        Figment, Jail,
        providers::{Format, Yaml},
    };

    use super::*;

    #[test]
    fn load_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r"
                    directory:
                      tenant: auth.example.com
                      client_id: the-client
                      client_secret: the-secret
                ",
            )?;

            let config = Figment::new()
                .merge(Yaml::file("config.yaml"))
                .extract_inner::<DirectoryConfig>("directory")?;

            assert_eq!(&config.tenant, "auth.example.com");
            assert_eq!(&config.client_id, "the-client");

            Ok(())
        });
    }

    #[test]
    fn tenant_must_be_a_domain() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r"
                    directory:
                      tenant: https://auth.example.com/
                      client_id: the-client
                      client_secret: the-secret
                ",
            )?;

            let figment = Figment::new().merge(Yaml::file("config.yaml"));
            let config = figment.extract_inner::<DirectoryConfig>("directory")?;
            assert!(config.validate(&figment).is_err());

            Ok(())
        });
    }
}
