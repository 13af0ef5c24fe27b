/*!
Mapping of numeric uids to display names
*/

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::core::{
    command::CommandRunner,
    event::UNKNOWN_USER,
};

/// Resolves a raw uid to a human-readable name.
///
/// Implementations never fail: anything that cannot be resolved comes back
/// as [`UNKNOWN_USER`].
#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn resolve(&self, user_id: Option<&str>) -> String;
}

/// Looks users up in the OS user database via `id -un <uid>`
pub struct SystemUserResolver {
    runner: Arc<dyn CommandRunner>,
}

impl SystemUserResolver {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl UserResolver for SystemUserResolver {
    async fn resolve(&self, user_id: Option<&str>) -> String {
        let Some(uid) = user_id.filter(|uid| !uid.is_empty() && uid.bytes().all(|b| b.is_ascii_digit())) else {
            return UNKNOWN_USER.to_string();
        };

        match self.runner.run("id", &["-un", uid]).await {
            Ok(output) if output.success => {
                let name = output.stdout.lines().next().unwrap_or("").trim();
                if name.is_empty() {
                    UNKNOWN_USER.to_string()
                } else {
                    name.to_string()
                }
            }
            Ok(output) => {
                warn!("No user found for uid {}: {}", uid, output.stderr.trim());
                UNKNOWN_USER.to_string()
            }
            Err(e) => {
                warn!("User lookup for uid {} failed: {}", uid, e);
                UNKNOWN_USER.to_string()
            }
        }
    }
}
