//! Identity provider
//!
//! Maps a role name to its capability set and credential material. The
//! lookup is pure; provisioning the accounts behind the credentials is
//! the job of whatever seeds the system under test.

use std::collections::{BTreeMap, BTreeSet};

use crate::common::config::RoleConfig;
use crate::common::{Error, Result};

/// How a request authenticates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    Bearer(String),
    Cookie { name: String, value: String },
    Basic {
        username: String,
        password: Option<String>,
    },
}

/// Resolved credentials for one role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub role: String,
    pub scheme: AuthScheme,
}

impl Credentials {
    /// Attach these credentials to an outgoing request
    pub fn apply(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.scheme {
            AuthScheme::Bearer(token) => builder.bearer_auth(token),
            AuthScheme::Cookie { name, value } => {
                builder.header(reqwest::header::COOKIE, format!("{}={}", name, value))
            }
            AuthScheme::Basic { username, password } => {
                builder.basic_auth(username, password.as_ref())
            }
        }
    }
}

/// Where a role's credential comes from
#[derive(Debug, Clone)]
enum CredentialSource {
    Static(AuthScheme),
    BearerEnv(String),
}

#[derive(Debug, Clone)]
struct Role {
    capabilities: BTreeSet<String>,
    source: CredentialSource,
}

/// Role registry
#[derive(Debug, Clone, Default)]
pub struct IdentityProvider {
    roles: BTreeMap<String, Role>,
}

impl IdentityProvider {
    /// Build the registry from the `[roles]` config section
    pub fn from_config(roles: &BTreeMap<String, RoleConfig>) -> Result<Self> {
        let mut provider = Self::default();
        for (name, config) in roles {
            let mut sources = Vec::new();
            if let Some(token) = &config.token {
                sources.push(CredentialSource::Static(AuthScheme::Bearer(token.clone())));
            }
            if let Some(var) = &config.token_env {
                sources.push(CredentialSource::BearerEnv(var.clone()));
            }
            if let Some(cookie) = &config.cookie {
                sources.push(CredentialSource::Static(AuthScheme::Cookie {
                    name: cookie.name.clone(),
                    value: cookie.value.clone(),
                }));
            }
            if let Some(basic) = &config.basic {
                sources.push(CredentialSource::Static(AuthScheme::Basic {
                    username: basic.username.clone(),
                    password: basic.password.clone(),
                }));
            }

            if sources.len() != 1 {
                return Err(Error::Config(format!(
                    "role '{}' needs exactly one of token, token_env, cookie, basic (found {})",
                    name,
                    sources.len()
                )));
            }
            let source = sources.remove(0);
            provider.register(name, config.capabilities.clone(), source);
        }
        Ok(provider)
    }

    /// Register a role with a static bearer token
    pub fn with_bearer(
        mut self,
        role: &str,
        token: &str,
        capabilities: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        self.register(
            role,
            capabilities.into_iter().map(String::from).collect(),
            CredentialSource::Static(AuthScheme::Bearer(token.to_string())),
        );
        self
    }

    fn register(&mut self, role: &str, capabilities: BTreeSet<String>, source: CredentialSource) {
        self.roles.insert(
            role.to_string(),
            Role {
                capabilities,
                source,
            },
        );
    }

    /// Resolve a role to credentials
    pub fn resolve(&self, role: &str) -> Result<Credentials> {
        let entry = self
            .roles
            .get(role)
            .ok_or_else(|| Error::unknown_role(role, &self.role_names()))?;

        let scheme = match &entry.source {
            CredentialSource::Static(scheme) => scheme.clone(),
            CredentialSource::BearerEnv(var) => {
                let token = std::env::var(var).map_err(|_| {
                    Error::Config(format!(
                        "role '{}' reads its token from ${}, which is not set",
                        role, var
                    ))
                })?;
                AuthScheme::Bearer(token)
            }
        };

        Ok(Credentials {
            role: role.to_string(),
            scheme,
        })
    }

    /// Whether a role is registered
    pub fn contains(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    /// Registered role names, sorted
    pub fn role_names(&self) -> Vec<&str> {
        self.roles.keys().map(String::as_str).collect()
    }

    /// Capabilities granted by a role
    pub fn capabilities(&self, role: &str) -> Result<&BTreeSet<String>> {
        self.roles
            .get(role)
            .map(|r| &r.capabilities)
            .ok_or_else(|| Error::unknown_role(role, &self.role_names()))
    }

    /// Roles granting a capability
    pub fn roles_with(&self, capability: &str) -> Vec<&str> {
        self.roles
            .iter()
            .filter(|(_, r)| r.capabilities.contains(capability))
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
