//! Per-operation credential context
//!
//! Secrets needed by a lifecycle operation are gathered once into a
//! `CredentialContext` and handed down by reference. Nothing is exported into
//! the process environment; when the operation returns the context is dropped
//! and every secret it holds is zeroed.

use super::provider::{CredentialProvider, SecretKind};
use super::secure::SecureString;
use crate::config::settings::DatabaseSettings;
use crate::error::StewardResult;
use crate::models::app_config::{AppConfig, DatabaseSection};

/// Connection parameters for the application database
#[derive(Debug, Clone)]
pub struct DbConnection {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: SecureString,
}

impl DbConnection {
    /// Host to connect to, with local names pinned to the IPv4 loopback
    ///
    /// `localhost` may resolve to `::1` first, which can select a host-based
    /// authentication rule the service account does not satisfy.
    pub fn connect_host(&self) -> &str {
        match self.host.as_str() {
            "" | "localhost" | "localhost.localdomain" | "::1" => "127.0.0.1",
            other => other,
        }
    }

    /// The config file section describing this connection
    pub fn to_section(&self, include_password: bool) -> DatabaseSection {
        DatabaseSection {
            host: self.host.clone(),
            port: self.port,
            name: self.name.clone(),
            user: self.user.clone(),
            password: include_password.then(|| self.password.as_str().to_string()),
        }
    }
}

/// Secrets for one lifecycle operation
#[derive(Debug)]
pub struct CredentialContext {
    pub database: DbConnection,
    pub signing_key: Option<SecureString>,
}

impl CredentialContext {
    /// Recover credentials from the application config, asking the provider
    /// only for what the file does not contain
    pub fn from_config(
        config: &AppConfig,
        provider: &dyn CredentialProvider,
    ) -> StewardResult<Self> {
        let section = &config.database;
        let password = match &section.password {
            Some(password) if !password.is_empty() => SecureString::new(password.clone()),
            _ => {
                tracing::info!("Database password not stored in config; requesting it");
                provider.obtain(SecretKind::DatabasePassword)?
            }
        };

        Ok(Self {
            database: DbConnection {
                host: section.host.clone(),
                port: section.port,
                name: section.name.clone(),
                user: section.user.clone(),
                password,
            },
            signing_key: config.secret_key.clone().map(SecureString::new),
        })
    }

    /// Fresh credentials for a new installation
    pub fn generate(
        settings: &DatabaseSettings,
        provider: &dyn CredentialProvider,
    ) -> StewardResult<Self> {
        Ok(Self {
            database: DbConnection {
                host: settings.host.clone(),
                port: settings.port,
                name: settings.name.clone(),
                user: settings.user.clone(),
                password: provider.obtain(SecretKind::DatabasePassword)?,
            },
            signing_key: Some(provider.obtain(SecretKind::SigningKey)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StewardError;
    use std::cell::Cell;
    use std::collections::BTreeMap;

    struct CountingProvider {
        calls: Cell<u32>,
    }

    impl CredentialProvider for CountingProvider {
        fn obtain(&self, _kind: SecretKind) -> StewardResult<SecureString> {
            self.calls.set(self.calls.get() + 1);
            Ok(SecureString::new("Prompted-Passw0rd!"))
        }
    }

    struct RefusingProvider;

    impl CredentialProvider for RefusingProvider {
        fn obtain(&self, kind: SecretKind) -> StewardResult<SecureString> {
            Err(StewardError::Credential(format!("no {}", kind)))
        }
    }

    fn config(password: Option<&str>) -> AppConfig {
        AppConfig {
            database: DatabaseSection {
                host: "localhost".into(),
                port: 5433,
                name: "webapp".into(),
                user: "webapp".into(),
                password: password.map(str::to_string),
            },
            secret_key: None,
            allowed_hosts: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_password_from_config_skips_provider() {
        let provider = CountingProvider { calls: Cell::new(0) };
        let ctx = CredentialContext::from_config(&config(Some("From-Config-9!")), &provider).unwrap();
        assert_eq!(ctx.database.password.as_str(), "From-Config-9!");
        assert_eq!(ctx.database.port, 5433);
        assert_eq!(provider.calls.get(), 0);
    }

    #[test]
    fn test_missing_password_asks_provider() {
        let provider = CountingProvider { calls: Cell::new(0) };
        let ctx = CredentialContext::from_config(&config(None), &provider).unwrap();
        assert_eq!(ctx.database.password.as_str(), "Prompted-Passw0rd!");
        assert_eq!(provider.calls.get(), 1);
    }

    #[test]
    fn test_missing_password_without_provider_fails() {
        let err = CredentialContext::from_config(&config(Some("")), &RefusingProvider).unwrap_err();
        assert!(matches!(err, StewardError::Credential(_)));
    }

    #[test]
    fn test_connect_host_pins_loopback() {
        let provider = CountingProvider { calls: Cell::new(0) };
        let mut ctx = CredentialContext::from_config(&config(Some("x")), &provider).unwrap();
        assert_eq!(ctx.database.connect_host(), "127.0.0.1");

        ctx.database.host = "::1".into();
        assert_eq!(ctx.database.connect_host(), "127.0.0.1");

        ctx.database.host = "db.internal".into();
        assert_eq!(ctx.database.connect_host(), "db.internal");
    }

    #[test]
    fn test_to_section_can_omit_password() {
        let provider = CountingProvider { calls: Cell::new(0) };
        let ctx = CredentialContext::from_config(&config(Some("x")), &provider).unwrap();
        assert!(ctx.database.to_section(false).password.is_none());
        assert_eq!(ctx.database.to_section(true).password.as_deref(), Some("x"));
    }
}
