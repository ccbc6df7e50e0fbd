//! Flat-file registry of known users and the chats they talk in.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use palaver_core::error::{PalaverError, Result};

use crate::backend::write_json_atomic;

/// Kind of chat a message arrived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    /// One-to-one chat whose id equals the user id.
    PersonalChat,
    TopicChat,
    GroupChat,
    /// Broadcast channels cannot host a conversation.
    Channel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    #[serde(default = "default_true")]
    pub announcements_enabled: bool,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub topic_chats: BTreeSet<String>,
    #[serde(default)]
    pub group_chats: BTreeSet<String>,
}

fn default_true() -> bool {
    true
}

impl User {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            announcements_enabled: true,
            active: true,
            topic_chats: BTreeSet::new(),
            group_chats: BTreeSet::new(),
        }
    }
}

/// Users keyed by id, one `{id}.json` file each under `dir`.
///
/// Every mutation is written through before the in-memory copy changes.
#[derive(Debug)]
pub struct UserRegistry {
    dir: PathBuf,
    users: BTreeMap<String, User>,
}

impl UserRegistry {
    /// Open the registry, loading every user file in `dir`.
    ///
    /// Unreadable files are skipped with a warning.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mut users = BTreeMap::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_user(&path) {
                Ok(user) => {
                    users.insert(user.user_id.clone(), user);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable user file"),
            }
        }
        info!(dir = %dir.display(), count = users.len(), "User registry loaded");
        Ok(Self {
            dir: dir.to_path_buf(),
            users,
        })
    }

    /// `{data_dir}/users`
    pub fn open_in(data_dir: &Path) -> Result<Self> {
        Self::open(&data_dir.join("users"))
    }

    /// Register a user. Existing ids are left untouched.
    pub fn add_user(&mut self, user_id: &str, username: &str) -> Result<&User> {
        if !self.users.contains_key(user_id) {
            let user = User::new(user_id, username);
            self.persist(&user)?;
            info!(user_id, username, "User added");
            self.users.insert(user_id.to_string(), user);
        }
        self.get_user(user_id)
    }

    pub fn get_user(&self, user_id: &str) -> Result<&User> {
        self.users.get(user_id).ok_or_else(|| not_found(user_id))
    }

    pub fn have_user(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    pub fn find_user(&self, username: &str) -> Option<&User> {
        self.users.values().find(|u| u.username == username)
    }

    pub fn activate_user(&mut self, user_id: &str) -> Result<()> {
        self.modify(user_id, |u| {
            u.active = true;
            Ok(())
        })
    }

    pub fn stop_user(&mut self, user_id: &str) -> Result<()> {
        self.modify(user_id, |u| {
            u.active = false;
            Ok(())
        })
    }

    pub fn start_announcements(&mut self, user_id: &str) -> Result<()> {
        self.modify(user_id, |u| {
            u.announcements_enabled = true;
            Ok(())
        })
    }

    pub fn stop_announcements(&mut self, user_id: &str) -> Result<()> {
        self.modify(user_id, |u| {
            u.announcements_enabled = false;
            Ok(())
        })
    }

    /// Record that `user_id` spoke in `chat_id`.
    pub fn update_user_chat(&mut self, user_id: &str, chat_id: &str, chat_type: ChatType) -> Result<()> {
        self.modify(user_id, |u| match chat_type {
            ChatType::PersonalChat if chat_id == u.user_id => Ok(()),
            ChatType::PersonalChat => Err(PalaverError::Validation(format!(
                "personal chat {chat_id} does not belong to user {}",
                u.user_id
            ))),
            ChatType::TopicChat => {
                u.topic_chats.insert(chat_id.to_string());
                Ok(())
            }
            ChatType::GroupChat => {
                u.group_chats.insert(chat_id.to_string());
                Ok(())
            }
            ChatType::Channel => Err(PalaverError::Validation(format!(
                "channel {chat_id} cannot be attached to a user"
            ))),
        })
    }

    pub fn active_users(&self) -> Vec<&User> {
        self.users.values().filter(|u| u.active).collect()
    }

    fn modify<F>(&mut self, user_id: &str, change: F) -> Result<()>
    where
        F: FnOnce(&mut User) -> Result<()>,
    {
        let mut updated = self.get_user(user_id)?.clone();
        change(&mut updated)?;
        self.persist(&updated)?;
        self.users.insert(user_id.to_string(), updated);
        Ok(())
    }

    fn persist(&self, user: &User) -> Result<()> {
        write_json_atomic(&self.dir.join(format!("{}.json", user.user_id)), user)
    }
}

fn read_user(path: &Path) -> Result<User> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn not_found(user_id: &str) -> PalaverError {
    PalaverError::NotFound {
        what: "user",
        name: user_id.to_string(),
    }
}
