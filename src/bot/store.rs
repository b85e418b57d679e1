//! Durable bot state: every persisted table in one JSON snapshot.
//!
//! Persistence is a full-snapshot overwrite after each mutating operation,
//! serialized through the owning lock. A failed save is logged and the
//! in-memory state stays authoritative until the next save succeeds;
//! retrying is always safe because the file is a complete overwrite.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Per-group behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSettings {
    pub passive_mode: bool,
    pub max_gifs: u32,
    pub safe_mode: bool,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            passive_mode: false,
            max_gifs: 3,
            safe_mode: true,
        }
    }
}

/// A time-boxed GIF challenge. At most one exists per chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub theme: String,
    pub creator_id: i64,
    /// user id -> submitted animation; a later submission from the same
    /// user replaces the earlier one.
    pub participants: HashMap<i64, String>,
    /// Serialized as RFC 3339 UTC so it round-trips exactly.
    pub end_time: DateTime<Utc>,
}

/// A one-shot future GIF post. The query is resolved at fire time, not
/// at schedule time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub chat_id: i64,
    pub query: String,
    pub fire_at: DateTime<Utc>,
    pub requester_id: i64,
}

/// The whole persisted state of the bot.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Store {
    /// chat id -> active challenge.
    #[serde(default)]
    pub challenges: HashMap<i64, Challenge>,
    /// post id -> pending scheduled post.
    #[serde(default)]
    pub scheduled_posts: HashMap<String, ScheduledPost>,
    /// user id -> GIFs delivered for that user.
    #[serde(default)]
    pub user_stats: HashMap<i64, u64>,
    #[serde(default)]
    pub group_settings: HashMap<i64, GroupSettings>,
    /// user id -> saved animation file ids, insertion order kept for /fav remove.
    #[serde(default)]
    pub favorites: HashMap<i64, Vec<String>>,
    /// user id -> keyword -> animation file id.
    #[serde(default)]
    pub labels: HashMap<i64, HashMap<String, String>>,
    /// Monotonic counter for scheduled-post ids, persisted so ids stay
    /// unique across restarts.
    #[serde(default)]
    next_post_seq: u64,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize: {e}"))?;

        std::fs::write(path, json).map_err(|e| format!("Failed to write: {e}"))?;

        debug!("💾 Saved state snapshot");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let json =
            std::fs::read_to_string(path).map_err(|e| format!("Failed to read: {e}"))?;

        let store: Store =
            serde_json::from_str(&json).map_err(|e| format!("Failed to parse: {e}"))?;

        info!(
            "Loaded state from {:?} ({} challenge(s), {} scheduled post(s))",
            path,
            store.challenges.len(),
            store.scheduled_posts.len()
        );
        Ok(store)
    }

    pub fn load_or_new(path: &Path) -> Self {
        if path.exists() {
            match Self::load(path) {
                Ok(store) => store,
                Err(e) => {
                    warn!("Failed to load state: {e}");
                    Self::new()
                }
            }
        } else {
            info!("No state file, starting fresh");
            Self::new()
        }
    }

    /// Generate the next scheduled-post id for a chat.
    pub fn next_post_id(&mut self, chat_id: i64) -> String {
        let seq = self.next_post_seq;
        self.next_post_seq += 1;
        format!("{chat_id}_{seq}")
    }

    /// Settings for a chat, falling back to defaults.
    pub fn settings(&self, chat_id: i64) -> GroupSettings {
        self.group_settings.get(&chat_id).cloned().unwrap_or_default()
    }

    /// Mutable settings for a chat, inserting defaults on first touch.
    pub fn settings_mut(&mut self, chat_id: i64) -> &mut GroupSettings {
        self.group_settings.entry(chat_id).or_default()
    }

    /// Credit delivered GIFs to a user's usage counter.
    pub fn credit_user(&mut self, user_id: i64, count: u64) {
        *self.user_stats.entry(user_id).or_insert(0) += count;
    }
}

/// Save the store if a snapshot path is configured, logging failures.
pub fn persist(store: &Store, path: Option<&Path>) {
    if let Some(path) = path
        && let Err(e) = store.save(path)
    {
        warn!("Failed to save state: {e}");
    }
}
