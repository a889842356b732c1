// Copyright 2025 BotForge contributors
//
//    Licensed under the Apache License, Version 2.0 (the "License");
//    you may not use this file except in compliance with the License.
//    You may obtain a copy of the License at
//
//        http://www.apache.org/licenses/LICENSE-2.0
//
//    Unless required by applicable law or agreed to in writing, software
//    distributed under the License is distributed on an "AS IS" BASIS,
//    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//    See the License for the specific language governing permissions and
//    limitations under the License.

//! BotForge configuration module
//!
//! # Description
//!
//! This module includes all the definitions for the app's settings and the
//! objects that automate reading the configuration from files or environment
//! variables and parsing them to Rust's native types.
//!
//! Secrets (the factory credential, the DB password, the credential
//! encryption key) must be overridden by environment variables. All the
//! environment variables that are meant to be used within this module shall
//! use the prefix _BOTFORGE_, for example:
//! `export BOTFORGE__SECURITY__ENCRYPTION_KEY="<64 hex chars>"`.

use config::{Config, ConfigError, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde_derive::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::time::Duration;

/// Name of the directory in which configuration files will be stored.
const CONF_DIR: &str = "config";

/// Main settings `struct`.
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Level for the tracing crate.
    pub tracing_level: String,
    /// Application specific settings.
    pub application: ApplicationSettings,
    /// Database backend settings.
    pub database: DatabaseSettings,
    /// Valkey backend that holds the ephemeral caches.
    pub cache: ValkeySettings,
    /// Credential-at-rest encryption settings.
    pub security: SecuritySettings,
    /// Scheduled-broadcast sweep settings.
    pub scheduler: SchedulerSettings,
}

/// Settings of the BotForge application.
#[derive(Debug, Deserialize)]
pub struct ApplicationSettings {
    /// Public base URL used to compose `{base}/webhook/{credential}`.
    pub webhook_base_url: String,
    pub http_server_host: String,
    pub http_server_port: u16,
    /// Upstream credential of the operator ("factory") bot.
    pub factory_credential: SecretString,
    /// The privileged user whose factory menu may see global stats.
    pub operator_user_id: i64,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Build the full path of the configuration directory.
        let base_path =
            std::env::current_dir().expect("Failed to determine the current directory.");
        let cfg_dir = base_path.join(CONF_DIR);

        let settings = Config::builder()
            // Start off by merging in the "default" configuration file.
            .add_source(File::from(cfg_dir.join("base")).required(true))
            .add_source(File::from(cfg_dir.join("local")).required(false))
            .add_source(Environment::with_prefix("botforge").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}

/// Settings for the database backend.
#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    pub pg_host: String,
    pub pg_port: u16,
    pub pg_user: String,
    pub pg_password: SecretString,
    pub pg_dbname: String,
    pub max_connections: Option<u32>,
}

/// Default size of the Postgres connection pool.
const PG_MAX_CONNECTIONS: u32 = 25;

impl DatabaseSettings {
    pub fn connect_options(&self) -> PgConnectOptions {
        self.connect_options_without_db().database(&self.pg_dbname)
    }

    /// Connection options without a database name, used by the test harness
    /// to create throwaway databases.
    pub fn connect_options_without_db(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.pg_host)
            .username(&self.pg_user)
            .password(self.pg_password.expose_secret())
            .port(self.pg_port)
            .ssl_mode(PgSslMode::Prefer)
    }

    pub fn pool_size(&self) -> u32 {
        self.max_connections.unwrap_or(PG_MAX_CONNECTIONS)
    }
}

const VALKEY_CONN_TIMEOUT: u64 = 1;
const VALKEY_RESP_TIMEOUT: u64 = 1;

/// Settings for Valkey.
#[derive(Debug, Deserialize)]
pub struct ValkeySettings {
    pub valkey_host: String,
    pub valkey_port: u16,
    pub valkey_password: Option<SecretString>,
    pub valkey_db_index: i64,
    /// TTL applied to message-link cache entries, in hours.
    pub default_ttl_hours: u64,
    pub valkey_conn_timeout: Option<u64>,
    pub valkey_resp_timeout: Option<u64>,
}

impl ValkeySettings {
    /// Connection URL in the `redis://[:password@]host:port/db` form.
    pub fn connection_url(&self) -> String {
        match self.valkey_password.as_ref().map(|p| p.expose_secret()) {
            Some(password) if !password.is_empty() => format!(
                "redis://:{}@{}:{}/{}",
                password, self.valkey_host, self.valkey_port, self.valkey_db_index
            ),
            _ => format!(
                "redis://{}:{}/{}",
                self.valkey_host, self.valkey_port, self.valkey_db_index
            ),
        }
    }

    pub fn connection_config(&self) -> redis::AsyncConnectionConfig {
        redis::AsyncConnectionConfig::new()
            .set_connection_timeout(Duration::from_secs(
                self.valkey_conn_timeout.unwrap_or(VALKEY_CONN_TIMEOUT),
            ))
            .set_response_timeout(Duration::from_secs(
                self.valkey_resp_timeout.unwrap_or(VALKEY_RESP_TIMEOUT),
            ))
    }

    pub fn link_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_hours * 3600)
    }
}

/// Settings for the credential encryption key.
#[derive(Debug, Deserialize)]
pub struct SecuritySettings {
    /// 32-byte key, hex encoded.
    pub encryption_key: SecretString,
}

/// Settings for the scheduled-message sweep.
#[derive(Debug, Deserialize)]
pub struct SchedulerSettings {
    pub interval_secs: u64,
    pub batch_limit: Option<i64>,
}

/// Default cap on rows selected per sweep tick.
const SCHEDULER_BATCH_LIMIT: i64 = 50;

impl SchedulerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn batch_limit(&self) -> i64 {
        self.batch_limit.unwrap_or(SCHEDULER_BATCH_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cache_settings(password: Option<&str>) -> ValkeySettings {
        ValkeySettings {
            valkey_host: "cache.local".to_owned(),
            valkey_port: 6380,
            valkey_password: password.map(|p| SecretString::from(p.to_owned())),
            valkey_db_index: 3,
            default_ttl_hours: 48,
            valkey_conn_timeout: None,
            valkey_resp_timeout: None,
        }
    }

    #[test]
    fn connection_url_without_password() {
        assert_eq!(
            cache_settings(None).connection_url(),
            "redis://cache.local:6380/3"
        );
    }

    #[test]
    fn connection_url_with_password() {
        assert_eq!(
            cache_settings(Some("hunter2")).connection_url(),
            "redis://:hunter2@cache.local:6380/3"
        );
    }

    #[test]
    fn empty_password_is_ignored() {
        assert_eq!(
            cache_settings(Some("")).connection_url(),
            "redis://cache.local:6380/3"
        );
    }

    #[test]
    fn link_ttl_is_hours() {
        assert_eq!(
            cache_settings(None).link_ttl(),
            Duration::from_secs(48 * 3600)
        );
    }
}
