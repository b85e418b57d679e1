//! Mock ports for engine tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::bot::telegram::ChatPort;
use crate::bot::tenor::GifProvider;

/// Records outgoing traffic instead of talking to Telegram.
pub struct MockChat {
    /// (chat_id, text)
    pub messages: Mutex<Vec<(i64, String)>>,
    /// (chat_id, media, caption)
    pub animations: Mutex<Vec<(i64, String, String)>>,
    pub admins: Vec<i64>,
    pub names: HashMap<i64, String>,
    /// When set, every send fails (dead file id, network down).
    pub fail_sends: bool,
}

impl MockChat {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            animations: Mutex::new(Vec::new()),
            admins: Vec::new(),
            names: HashMap::new(),
            fail_sends: false,
        }
    }
}

#[async_trait]
impl ChatPort for MockChat {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), String> {
        if self.fail_sends {
            return Err("send failed".to_string());
        }
        self.messages.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn send_animation(
        &self,
        chat_id: i64,
        media: &str,
        caption: &str,
    ) -> Result<(), String> {
        if self.fail_sends {
            return Err("send failed".to_string());
        }
        self.animations
            .lock()
            .unwrap()
            .push((chat_id, media.to_string(), caption.to_string()));
        Ok(())
    }

    async fn member_display_name(&self, _chat_id: i64, user_id: i64) -> Option<String> {
        self.names.get(&user_id).cloned()
    }

    async fn is_admin(&self, _chat_id: i64, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }
}

/// Canned search results keyed by query.
pub struct MockGifs {
    pub by_query: HashMap<String, Vec<String>>,
    pub trending: Vec<String>,
}

impl MockGifs {
    pub fn new() -> Self {
        Self {
            by_query: HashMap::new(),
            trending: Vec::new(),
        }
    }

    pub fn with_result(query: &str, urls: &[&str]) -> Self {
        let mut gifs = Self::new();
        gifs.by_query
            .insert(query.to_string(), urls.iter().map(|u| u.to_string()).collect());
        gifs
    }
}

#[async_trait]
impl GifProvider for MockGifs {
    async fn search(&self, query: &str, limit: usize, _safe_mode: bool) -> Vec<String> {
        let mut urls = self.by_query.get(query).cloned().unwrap_or_default();
        urls.truncate(limit);
        urls
    }

    async fn trending(&self, limit: usize) -> Vec<String> {
        let mut urls = self.trending.clone();
        urls.truncate(limit);
        urls
    }
}
