use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{domain::UserId, Result};

/// On-disk shape: `{ "authorized_users": [1, 2, 3] }`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    authorized_users: Vec<UserId>,
}

/// Durable, insert-only set of users who have talked to the bot.
///
/// The registry does not own the in-memory set; the relay holds the snapshot
/// and hands it back here on every mutation.
#[derive(Clone, Debug)]
pub struct UserRegistry {
    path: PathBuf,
}

impl UserRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted set. A missing or blank file is an empty registry.
    pub fn try_load(&self) -> Result<BTreeSet<UserId>> {
        if !self.path.exists() {
            return Ok(BTreeSet::new());
        }
        let txt = std::fs::read_to_string(&self.path)?;
        if txt.trim().is_empty() {
            return Ok(BTreeSet::new());
        }
        let data: RegistryFile = serde_json::from_str(&txt)?;
        Ok(data.authorized_users.into_iter().collect())
    }

    /// Like [`try_load`](Self::try_load), but unreadable content is logged and treated as empty.
    pub fn load(&self) -> BTreeSet<UserId> {
        self.try_load().unwrap_or_else(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "failed to load user registry");
            BTreeSet::new()
        })
    }

    pub fn try_save(&self, users: &BTreeSet<UserId>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let data = RegistryFile {
            authorized_users: users.iter().copied().collect(),
        };
        let txt = serde_json::to_string_pretty(&data)?;
        std::fs::write(&self.path, txt)?;
        Ok(())
    }

    /// Persist the full set; write failures are logged, never raised.
    pub fn save(&self, users: &BTreeSet<UserId>) {
        if let Err(e) = self.try_save(users) {
            tracing::error!(path = %self.path.display(), error = %e, "failed to save user registry");
        }
    }

    /// Union-insert `user`, persist the result and hand it back.
    pub fn add(&self, user: UserId, mut users: BTreeSet<UserId>) -> BTreeSet<UserId> {
        users.insert(user);
        self.save(&users);
        users
    }
}
