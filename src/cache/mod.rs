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

//! Ephemeral cache layer over Valkey.
//!
//! # Description
//!
//! Every family in here mirrors state the store owns (or holds short-lived
//! conversational state that nothing owns durably); none of it is
//! authoritative. Keys compose as `<family>:<credential>:<suffix>` so a
//! whole tenant can be invalidated with one pattern sweep when it stops.
//!
//! Families and TTLs:
//!
//! | family | key | TTL | invalidated by |
//! |---|---|---|---|
//! | `msg` | cred, admin msg id | 48 h (configurable) | tenant stop |
//! | `session` | cred, user id | none | tenant stop |
//! | `state` | cred, owner id | 5 min | flow completion |
//! | `temp` | cred, owner id, slot | 10 min | flow completion |
//! | `bcast` / `bcastmsg` | cred, owner id | 10 min | cancel or confirm |
//! | `ban` / `noban` | cred, user id | 24 h / 5 min | unban / ban |
//! | `areply` | cred, type, trigger | 24 h | delete or update |
//! | `flag` / `setting` | cred, name | 24 h | owner toggle |
//! | `subok` | cred, user id | 1 h | channel-list change |

mod auto_replies;
mod bans;
mod flags;
mod links;
mod owner_state;
mod sessions;
mod subs;

pub use auto_replies::CachedReply;

use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tracing::{instrument, trace};

use crate::{configuration::ValkeySettings, errors::CacheError};

pub(crate) const OWNER_STATE_TTL: u64 = 5 * 60;
pub(crate) const TEMP_SLOT_TTL: u64 = 10 * 60;
pub(crate) const BROADCAST_TTL: u64 = 10 * 60;
pub(crate) const BAN_POSITIVE_TTL: u64 = 24 * 3600;
pub(crate) const BAN_NEGATIVE_TTL: u64 = 5 * 60;
pub(crate) const AUTO_REPLY_TTL: u64 = 24 * 3600;
pub(crate) const FLAG_TTL: u64 = 24 * 3600;
pub(crate) const SUB_VERIFIED_TTL: u64 = 3600;

/// Handle over the Valkey backend. Cheap to clone; connections are
/// multiplexed.
#[derive(Clone)]
pub struct CacheClient {
    client: redis::Client,
    config: redis::AsyncConnectionConfig,
    link_ttl: Duration,
}

impl CacheClient {
    pub fn new(settings: &ValkeySettings) -> Result<Self, CacheError> {
        Ok(CacheClient {
            client: redis::Client::open(settings.connection_url())?,
            config: settings.connection_config(),
            link_ttl: settings.link_ttl(),
        })
    }

    pub(crate) async fn connection(&self) -> Result<MultiplexedConnection, CacheError> {
        Ok(self
            .client
            .get_multiplexed_async_connection_with_config(&self.config)
            .await?)
    }

    /// Boot-time health check.
    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut con).await?;
        Ok(())
    }

    pub(crate) fn link_ttl_secs(&self) -> u64 {
        self.link_ttl.as_secs()
    }

    /// Collect every key matching `pattern` with a full SCAN walk.
    pub(crate) async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut con = self.connection().await?;
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut con)
                .await?;

            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }

    pub(crate) async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        let keys = self.scan_keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }

        let mut con = self.connection().await?;
        let removed = keys.len();
        let _: () = con.del(keys).await?;

        Ok(removed)
    }

    /// Drop every cached entry belonging to a credential. Called when a
    /// tenant stops or is deleted.
    #[instrument(name = "Purge tenant caches", skip_all)]
    pub async fn purge_tenant(&self, credential: &str) -> Result<(), CacheError> {
        for family in [
            "msg", "session", "state", "temp", "bcast", "bcastmsg", "ban", "noban", "areply",
            "flag", "setting", "subok",
        ] {
            let removed = self
                .delete_matching(&format!("{family}:{credential}:*"))
                .await?;
            if removed > 0 {
                trace!("Dropped {removed} `{family}` entries");
            }
        }

        Ok(())
    }
}

// Key builders are plain functions so the composition rules are testable
// without a server.

pub(crate) fn link_key(credential: &str, admin_msg_id: i64) -> String {
    format!("msg:{credential}:{admin_msg_id}")
}

pub(crate) fn session_key(credential: &str, user_id: i64) -> String {
    format!("session:{credential}:{user_id}")
}

pub(crate) fn owner_state_key(credential: &str, owner_id: i64) -> String {
    format!("state:{credential}:{owner_id}")
}

pub(crate) fn temp_slot_key(credential: &str, owner_id: i64, slot: &str) -> String {
    format!("temp:{credential}:{owner_id}:{slot}")
}

pub(crate) fn broadcast_mode_key(credential: &str, owner_id: i64) -> String {
    format!("bcast:{credential}:{owner_id}")
}

pub(crate) fn pending_broadcast_key(credential: &str, owner_id: i64) -> String {
    format!("bcastmsg:{credential}:{owner_id}")
}

pub(crate) fn ban_key(credential: &str, user_id: i64) -> String {
    format!("ban:{credential}:{user_id}")
}

pub(crate) fn no_ban_key(credential: &str, user_id: i64) -> String {
    format!("noban:{credential}:{user_id}")
}

pub(crate) fn auto_reply_key(credential: &str, kind: &str, trigger: &str) -> String {
    format!("areply:{credential}:{kind}:{trigger}")
}

pub(crate) fn flag_key(credential: &str, name: &str) -> String {
    format!("flag:{credential}:{name}")
}

pub(crate) fn setting_key(credential: &str, name: &str) -> String {
    format!("setting:{credential}:{name}")
}

pub(crate) fn sub_verified_key(credential: &str, user_id: i64) -> String {
    format!("subok:{credential}:{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CRED: &str = "42:secretsecretsecretsecretsecret42";

    #[test]
    fn keys_compose_family_credential_suffix() {
        assert_eq!(link_key(CRED, 7), format!("msg:{CRED}:7"));
        assert_eq!(session_key(CRED, 200), format!("session:{CRED}:200"));
        assert_eq!(
            temp_slot_key(CRED, 100, "trigger"),
            format!("temp:{CRED}:100:trigger")
        );
        assert_eq!(
            auto_reply_key(CRED, "keyword", "hello"),
            format!("areply:{CRED}:keyword:hello")
        );
    }

    #[test]
    fn ban_sides_use_distinct_families() {
        assert_ne!(ban_key(CRED, 5), no_ban_key(CRED, 5));
        assert!(ban_key(CRED, 5).starts_with("ban:"));
        assert!(no_ban_key(CRED, 5).starts_with("noban:"));
    }
}
