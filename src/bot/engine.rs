//! Command execution over the store and the two scheduling engines.
//!
//! Each operation performs its own replies through the chat port and
//! returns `Err` only for conditions the command layer should render
//! (validation, missing records, permission refusals).

use rand::seq::IndexedRandom;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::bot::challenge::ChallengeEngine;
use crate::bot::commands::split_query_count;
use crate::bot::error::EngineError;
use crate::bot::scheduler::SchedulerEngine;
use crate::bot::store::{persist, Store};
use crate::bot::telegram::ChatPort;
use crate::bot::tenor::GifProvider;

/// Hard cap on GIFs per search, whatever the group default says.
const MAX_SEARCH_COUNT: usize = 5;

/// Keyword triggers for passive mode and the queries they map to.
const TRIGGERS: &[(&str, &[&str])] = &[
    ("lol", &["funny", "laugh", "lmao"]),
    ("bruh", &["facepalm", "really", "seriously"]),
    ("sad", &["crying", "tear", "depression"]),
    ("happy", &["celebration", "joy", "party"]),
    ("angry", &["mad", "rage", "furious"]),
    ("love", &["heart", "romance", "cute"]),
    ("wow", &["amazed", "surprised", "mind blown"]),
    ("tired", &["sleepy", "exhausted", "yawn"]),
];

const RANDOM_QUERIES: &[&str] = &[
    "random", "surprise", "funny", "cute", "awesome", "cool", "amazing", "wow", "epic", "crazy",
];

const QUOTES: &[&str] = &[
    "The only way to do great work is to love what you do. - Steve Jobs",
    "Innovation distinguishes between a leader and a follower. - Steve Jobs",
    "Life is what happens to you while you're busy making other plans. - John Lennon",
    "The future belongs to those who believe in the beauty of their dreams. - Eleanor Roosevelt",
    "It is during our darkest moments that we must focus to see the light. - Aristotle",
    "Success is not final, failure is not fatal: it is the courage to continue that counts. - Winston Churchill",
    "The only impossible journey is the one you never begin. - Tony Robbins",
    "In the midst of winter, I found there was, within me, an invincible summer. - Albert Camus",
    "Be yourself; everyone else is already taken. - Oscar Wilde",
    "Two roads diverged in a wood, and I— I took the one less traveled by. - Robert Frost",
];

const WELCOME_TEXT: &str = "🎬 **Welcome to gifgram!** 🎬\n\n\
I'm here to make your chats more fun with GIFs! Here's what I can do:\n\n\
🔍 **Search:**\n\
/s query - Search for GIFs\n\
/s query n - Get multiple GIFs (max 5)\n\
/r query - Random GIF from query\n\
/trending - Top trending GIFs\n\n\
⭐ **Favorites:**\n\
/fav add - Reply to a GIF to save it\n\
/fav list - Show your favorites\n\
/gif keyword - Quick access to labeled GIFs\n\n\
🏆 **Challenges:**\n\
/challenge seconds theme - Start a GIF challenge\n\
/entry - Submit (reply to a GIF)\n\n\
📊 **Fun stuff:**\n\
/stats - Your GIF usage stats\n\
/quote query - Quote + matching GIF\n\
/schedule HH:MM query - Schedule GIF posts\n\n\
Type /help for detailed command info!";

const HELP_TEXT: &str = "🎬 **gifgram help** 🎬\n\n\
🔍 **Search**\n\
/s query - best GIF for the query\n\
/s query n - up to 5 GIFs\n\
/r query - random pick from the top 20\n\
/trending - what's trending now\n\n\
⭐ **Favorites & labels**\n\
/fav add - reply to any GIF to save it\n\
/fav list - view saved GIFs\n\
/fav remove n - remove favorite number n\n\
/label keyword - reply to a GIF to label it\n\
/gif keyword - send a labeled GIF\n\n\
🏆 **Challenges**\n\
/challenge seconds theme - start a timed challenge\n\
/entry - reply to a GIF to enter\n\
/endchallenge - cancel (creator or admin)\n\
A random entrant wins when the timer runs out!\n\n\
⏰ **Scheduling**\n\
/schedule HH:MM query - post a GIF later (24-hour clock)\n\n\
⚙️ **Admin**\n\
/toggle - passive mode (react to lol, bruh, sad...)\n\
/setmax n - default GIF count (1-5)\n\
/safe - NSFW filtering on/off\n\n\
📊 /stats - your usage stats";

pub struct GifBotEngine {
    store: Arc<Mutex<Store>>,
    snapshot_path: Option<PathBuf>,
    chat: Arc<dyn ChatPort>,
    gifs: Arc<dyn GifProvider>,
    challenge: Arc<ChallengeEngine>,
    scheduler: Arc<SchedulerEngine>,
    /// Compiled word-boundary patterns for TRIGGERS.
    triggers: Vec<(Regex, &'static [&'static str])>,
}

impl GifBotEngine {
    pub fn new(
        store: Arc<Mutex<Store>>,
        snapshot_path: Option<PathBuf>,
        chat: Arc<dyn ChatPort>,
        gifs: Arc<dyn GifProvider>,
    ) -> Self {
        let challenge = Arc::new(ChallengeEngine::new(
            store.clone(),
            snapshot_path.clone(),
            chat.clone(),
        ));
        let scheduler = Arc::new(SchedulerEngine::new(
            store.clone(),
            snapshot_path.clone(),
            chat.clone(),
            gifs.clone(),
        ));

        let triggers = TRIGGERS
            .iter()
            .map(|&(word, queries)| {
                let pattern = Regex::new(&format!(r"(?i)\b{word}\b"))
                    .expect("trigger patterns are static");
                (pattern, queries)
            })
            .collect();

        Self {
            store,
            snapshot_path,
            chat,
            gifs,
            challenge,
            scheduler,
            triggers,
        }
    }

    /// Re-arm every pending action found in the snapshot.
    pub async fn rehydrate(&self) {
        self.challenge.rehydrate().await;
        self.scheduler.rehydrate().await;
    }

    async fn credit(&self, user_id: i64, count: u64) {
        let mut store = self.store.lock().await;
        store.credit_user(user_id, count);
        persist(&store, self.snapshot_path.as_deref());
    }

    pub async fn welcome(&self, chat_id: i64) {
        self.chat.send_message(chat_id, WELCOME_TEXT).await.ok();
    }

    pub async fn help(&self, chat_id: i64) {
        self.chat.send_message(chat_id, HELP_TEXT).await.ok();
    }

    // ==================== SEARCH ====================

    pub async fn search(
        &self,
        chat_id: i64,
        user_id: i64,
        args: &str,
    ) -> Result<(), EngineError> {
        let Some((query, count)) = split_query_count(args) else {
            return Err(EngineError::Validation(
                "🔍 Usage: /s query or /s query n".to_string(),
            ));
        };

        let settings = { self.store.lock().await.settings(chat_id) };
        let count = count
            .unwrap_or(settings.max_gifs as usize)
            .clamp(1, MAX_SEARCH_COUNT);

        let urls = self.gifs.search(&query, count, settings.safe_mode).await;
        if urls.is_empty() {
            let text = format!("🚫 No GIFs found for \"{query}\" 😢");
            self.chat.send_message(chat_id, &text).await.ok();
            return Ok(());
        }

        for (i, url) in urls.iter().enumerate() {
            let caption = if urls.len() > 1 {
                format!("🎬 **Result {}** for *{query}*", i + 1)
            } else {
                format!("🎬 *{query}*")
            };
            self.chat.send_animation(chat_id, url, &caption).await.ok();
        }

        self.credit(user_id, urls.len() as u64).await;
        Ok(())
    }

    pub async fn random(
        &self,
        chat_id: i64,
        user_id: i64,
        query: &str,
    ) -> Result<(), EngineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::Validation("🎲 Usage: /r query".to_string()));
        }

        let safe_mode = { self.store.lock().await.settings(chat_id).safe_mode };
        let urls = self.gifs.search(query, 20, safe_mode).await;

        let Some(url) = urls.choose(&mut rand::rng()) else {
            let text = format!("🚫 No GIFs found for \"{query}\" 😢");
            self.chat.send_message(chat_id, &text).await.ok();
            return Ok(());
        };

        let caption = format!("🎲 **Random GIF** for *{query}*");
        self.chat.send_animation(chat_id, url, &caption).await.ok();
        self.credit(user_id, 1).await;
        Ok(())
    }

    pub async fn trending(&self, chat_id: i64, user_id: i64) -> Result<(), EngineError> {
        let urls = self.gifs.trending(3).await;
        if urls.is_empty() {
            self.chat
                .send_message(chat_id, "🚫 Couldn't fetch trending GIFs right now 😢")
                .await
                .ok();
            return Ok(());
        }

        self.chat
            .send_message(chat_id, "🔥 **Trending GIFs right now:**")
            .await
            .ok();
        for (i, url) in urls.iter().enumerate() {
            let caption = format!("🔥 **Trending #{}**", i + 1);
            self.chat.send_animation(chat_id, url, &caption).await.ok();
        }

        self.credit(user_id, urls.len() as u64).await;
        Ok(())
    }

    pub async fn quote(&self, chat_id: i64, user_id: i64, query: &str) -> Result<(), EngineError> {
        let query = if query.trim().is_empty() {
            "motivation"
        } else {
            query.trim()
        };

        let quote = QUOTES.choose(&mut rand::rng()).copied().unwrap_or(QUOTES[0]);
        let text = format!("✨ **Daily Motivation** ✨\n\n*{quote}*");
        self.chat.send_message(chat_id, &text).await.ok();

        let safe_mode = { self.store.lock().await.settings(chat_id).safe_mode };
        let urls = self.gifs.search(query, 5, safe_mode).await;
        let picked = urls.choose(&mut rand::rng()).cloned();
        if let Some(url) = picked {
            let caption = format!("🎬 *{query} vibes*");
            self.chat.send_animation(chat_id, &url, &caption).await.ok();
            self.credit(user_id, 1).await;
        }
        Ok(())
    }

    pub async fn random_topic(&self, chat_id: i64, user_id: i64) -> Result<(), EngineError> {
        let query = RANDOM_QUERIES
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or("random");

        let safe_mode = { self.store.lock().await.settings(chat_id).safe_mode };
        let urls = self.gifs.search(query, 20, safe_mode).await;

        let Some(url) = urls.choose(&mut rand::rng()) else {
            self.chat
                .send_message(chat_id, "🎲 Couldn't find a random GIF right now!")
                .await
                .ok();
            return Ok(());
        };

        self.chat
            .send_animation(chat_id, url, "🎲 **Random GIF!**")
            .await
            .ok();
        self.credit(user_id, 1).await;
        Ok(())
    }

    // ==================== FAVORITES & LABELS ====================

    /// `/fav` subcommand dispatch. `reply_file` is the animation of the
    /// replied-to message, if any.
    pub async fn favorites(
        &self,
        chat_id: i64,
        user_id: i64,
        args: &str,
        reply_file: Option<&str>,
    ) -> Result<(), EngineError> {
        let mut parts = args.split_whitespace();
        match parts.next() {
            None | Some("list") => self.fav_list(chat_id, user_id).await,
            Some("add") => self.fav_add(chat_id, user_id, reply_file).await,
            Some("remove") => self.fav_remove(chat_id, user_id, parts.next()).await,
            Some(_) => Err(EngineError::Validation(
                "⭐ **Favorites:**\n/fav add - reply to a GIF to save it\n\
                 /fav list - show your favorites\n/fav remove n - remove favorite"
                    .to_string(),
            )),
        }
    }

    async fn fav_add(
        &self,
        chat_id: i64,
        user_id: i64,
        reply_file: Option<&str>,
    ) -> Result<(), EngineError> {
        let file_id = reply_file.ok_or_else(|| {
            EngineError::Validation("⭐ **Reply to a GIF** with /fav add to save it!".to_string())
        })?;

        let total = {
            let mut store = self.store.lock().await;
            let favs = store.favorites.entry(user_id).or_default();
            if favs.iter().any(|f| f == file_id) {
                None
            } else {
                favs.push(file_id.to_string());
                let total = favs.len();
                persist(&store, self.snapshot_path.as_deref());
                Some(total)
            }
        };

        let text = match total {
            Some(total) => format!(
                "⭐ **GIF saved to favorites!** ({total} total)\nUse /fav list to see them all!"
            ),
            None => "⭐ This GIF is already in your favorites!".to_string(),
        };
        self.chat.send_message(chat_id, &text).await.ok();
        Ok(())
    }

    async fn fav_list(&self, chat_id: i64, user_id: i64) -> Result<(), EngineError> {
        let favs = {
            let store = self.store.lock().await;
            store.favorites.get(&user_id).cloned().unwrap_or_default()
        };

        if favs.is_empty() {
            self.chat
                .send_message(
                    chat_id,
                    "⭐ You don't have any favorite GIFs yet!\nReply to any GIF with /fav add to save it.",
                )
                .await
                .ok();
            return Ok(());
        }

        let text = format!("⭐ **Your {} favorite GIF(s):**", favs.len());
        self.chat.send_message(chat_id, &text).await.ok();

        let mut dead = Vec::new();
        for (i, file_id) in favs.iter().take(10).enumerate() {
            let caption = format!("⭐ **Favorite #{}**", i + 1);
            if self
                .chat
                .send_animation(chat_id, file_id, &caption)
                .await
                .is_err()
            {
                dead.push(file_id.clone());
            }
        }

        if favs.len() > 10 {
            let text = format!("... and {} more!", favs.len() - 10);
            self.chat.send_message(chat_id, &text).await.ok();
        }

        // Telegram no longer accepts these file ids, drop them
        if !dead.is_empty() {
            warn!("Dropping {} dead favorite(s) for user {user_id}", dead.len());
            let mut store = self.store.lock().await;
            if let Some(favs) = store.favorites.get_mut(&user_id) {
                favs.retain(|f| !dead.contains(f));
            }
            persist(&store, self.snapshot_path.as_deref());
        }
        Ok(())
    }

    async fn fav_remove(
        &self,
        chat_id: i64,
        user_id: i64,
        arg: Option<&str>,
    ) -> Result<(), EngineError> {
        let index: usize = arg
            .and_then(|a| a.parse().ok())
            .ok_or_else(|| EngineError::Validation("⭐ Usage: /fav remove n".to_string()))?;

        {
            let mut store = self.store.lock().await;
            let favs = store.favorites.entry(user_id).or_default();
            if index == 0 || index > favs.len() {
                return Err(EngineError::Validation(
                    "⭐ Invalid favorite number!".to_string(),
                ));
            }
            favs.remove(index - 1);
            persist(&store, self.snapshot_path.as_deref());
        }

        let text = format!("⭐ **Favorite #{index} removed!**");
        self.chat.send_message(chat_id, &text).await.ok();
        Ok(())
    }

    pub async fn label(
        &self,
        chat_id: i64,
        user_id: i64,
        keyword: &str,
        reply_file: Option<&str>,
    ) -> Result<(), EngineError> {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return Err(EngineError::Validation(
                "🏷️ Usage: /label keyword (reply to a GIF)".to_string(),
            ));
        }
        let file_id = reply_file.ok_or_else(|| {
            EngineError::Validation("🏷️ **Please reply to a GIF** with /label keyword".to_string())
        })?;

        {
            let mut store = self.store.lock().await;
            store
                .labels
                .entry(user_id)
                .or_default()
                .insert(keyword.clone(), file_id.to_string());
            persist(&store, self.snapshot_path.as_deref());
        }

        let text = format!(
            "🏷️ **GIF labeled as \"{keyword}\"**\nUse /gif {keyword} to access it quickly!"
        );
        self.chat.send_message(chat_id, &text).await.ok();
        Ok(())
    }

    pub async fn quick_gif(
        &self,
        chat_id: i64,
        user_id: i64,
        keyword: &str,
    ) -> Result<(), EngineError> {
        let keyword = keyword.trim().to_lowercase();

        if keyword.is_empty() {
            let labels: Vec<String> = {
                let store = self.store.lock().await;
                store
                    .labels
                    .get(&user_id)
                    .map(|m| m.keys().take(10).cloned().collect())
                    .unwrap_or_default()
            };

            let text = if labels.is_empty() {
                "🏷️ **No labeled GIFs yet!**\nReply to any GIF with /label keyword to save it"
                    .to_string()
            } else {
                format!(
                    "🏷️ **Your labeled GIFs:**\n{}\n\nUsage: /gif keyword",
                    labels.join(", ")
                )
            };
            self.chat.send_message(chat_id, &text).await.ok();
            return Ok(());
        }

        let file_id = {
            let store = self.store.lock().await;
            store
                .labels
                .get(&user_id)
                .and_then(|m| m.get(&keyword))
                .cloned()
        };

        let Some(file_id) = file_id else {
            let text = format!(
                "🏷️ **No GIF labeled \"{keyword}\"**\nUse /gif to see your labeled GIFs"
            );
            self.chat.send_message(chat_id, &text).await.ok();
            return Ok(());
        };

        let caption = format!("🏷️ **{keyword}**");
        if self
            .chat
            .send_animation(chat_id, &file_id, &caption)
            .await
            .is_ok()
        {
            self.credit(user_id, 1).await;
        } else {
            // Dead file id, forget the label
            {
                let mut store = self.store.lock().await;
                if let Some(labels) = store.labels.get_mut(&user_id) {
                    labels.remove(&keyword);
                }
                persist(&store, self.snapshot_path.as_deref());
            }
            let text = format!(
                "🏷️ **\"{keyword}\" GIF is no longer available**\nIt has been removed from your labels"
            );
            self.chat.send_message(chat_id, &text).await.ok();
        }
        Ok(())
    }

    // ==================== CHALLENGES ====================

    pub async fn challenge_start(
        &self,
        chat_id: i64,
        user_id: i64,
        args: &str,
    ) -> Result<(), EngineError> {
        let usage = || {
            EngineError::Validation(
                "🏆 Usage: /challenge seconds theme\nExample: /challenge 300 monday mood"
                    .to_string(),
            )
        };

        let mut parts = args.split_whitespace();
        let duration_secs: u64 = parts
            .next()
            .and_then(|a| a.parse().ok())
            .ok_or_else(usage)?;
        let theme = parts.collect::<Vec<_>>().join(" ");
        if theme.is_empty() {
            return Err(usage());
        }

        let challenge = self
            .challenge
            .start(chat_id, &theme, duration_secs, user_id)
            .await;

        let text = format!(
            "🏆 **Challenge started:** *{}*\n\
             Reply to a GIF with /entry to join.\n\
             ⏱️ Winner drawn at {} UTC!",
            challenge.theme,
            challenge.end_time.format("%H:%M:%S")
        );
        self.chat.send_message(chat_id, &text).await.ok();
        Ok(())
    }

    pub async fn challenge_entry(
        &self,
        chat_id: i64,
        user_id: i64,
        reply_file: Option<&str>,
    ) -> Result<(), EngineError> {
        let file_id = reply_file.ok_or_else(|| {
            EngineError::Validation("🏆 **Reply to a GIF** with /entry to submit it!".to_string())
        })?;

        self.challenge.submit(chat_id, user_id, file_id).await?;
        self.chat
            .send_message(chat_id, "🏆 Entry received! Good luck 🍀")
            .await
            .ok();
        Ok(())
    }

    pub async fn challenge_end(
        &self,
        chat_id: i64,
        user_id: i64,
        is_admin: bool,
    ) -> Result<(), EngineError> {
        self.challenge.cancel(chat_id, user_id, is_admin).await?;
        self.chat
            .send_message(chat_id, "🏆 Challenge cancelled — no winner this time.")
            .await
            .ok();
        Ok(())
    }

    // ==================== SCHEDULING ====================

    pub async fn schedule(
        &self,
        chat_id: i64,
        user_id: i64,
        args: &str,
    ) -> Result<(), EngineError> {
        let (time_str, query) = args.trim().split_once(char::is_whitespace).ok_or_else(|| {
            EngineError::Validation(
                "⏰ Usage: /schedule HH:MM query\nExample: /schedule 15:30 celebration"
                    .to_string(),
            )
        })?;

        let post = self
            .scheduler
            .schedule(chat_id, time_str, query, user_id)
            .await?;

        let text = format!(
            "⏰ **GIF scheduled!**\n📅 Time: {time_str}\n🔍 Query: {}",
            post.query
        );
        self.chat.send_message(chat_id, &text).await.ok();
        Ok(())
    }

    // ==================== SETTINGS (admin) ====================

    pub async fn toggle_passive(
        &self,
        chat_id: i64,
        is_admin: bool,
    ) -> Result<(), EngineError> {
        if !is_admin {
            return Err(EngineError::Forbidden);
        }

        let enabled = {
            let mut store = self.store.lock().await;
            let settings = store.settings_mut(chat_id);
            settings.passive_mode = !settings.passive_mode;
            let enabled = settings.passive_mode;
            persist(&store, self.snapshot_path.as_deref());
            enabled
        };

        let text = if enabled {
            "🤖 **Passive mode enabled!**\nI will now react to keywords like \"lol\", \"bruh\", \"sad\""
        } else {
            "🤖 **Passive mode disabled!**\nI will no longer react to keywords"
        };
        self.chat.send_message(chat_id, text).await.ok();
        Ok(())
    }

    pub async fn set_max_gifs(
        &self,
        chat_id: i64,
        is_admin: bool,
        arg: &str,
    ) -> Result<(), EngineError> {
        if !is_admin {
            return Err(EngineError::Forbidden);
        }

        let count: u32 = arg
            .trim()
            .parse()
            .map_err(|_| EngineError::Validation("⚙️ Usage: /setmax 1-5".to_string()))?;
        let count = count.clamp(1, MAX_SEARCH_COUNT as u32);

        {
            let mut store = self.store.lock().await;
            store.settings_mut(chat_id).max_gifs = count;
            persist(&store, self.snapshot_path.as_deref());
        }

        let text = format!("⚙️ **Default GIF count set to {count}**");
        self.chat.send_message(chat_id, &text).await.ok();
        Ok(())
    }

    pub async fn toggle_safe_mode(
        &self,
        chat_id: i64,
        is_admin: bool,
    ) -> Result<(), EngineError> {
        if !is_admin {
            return Err(EngineError::Forbidden);
        }

        let enabled = {
            let mut store = self.store.lock().await;
            let settings = store.settings_mut(chat_id);
            settings.safe_mode = !settings.safe_mode;
            let enabled = settings.safe_mode;
            persist(&store, self.snapshot_path.as_deref());
            enabled
        };

        let text = format!(
            "🔒 **Safe mode {}!**\nNSFW content filtering is now {}",
            if enabled { "enabled" } else { "disabled" },
            if enabled { "ON" } else { "OFF" }
        );
        self.chat.send_message(chat_id, &text).await.ok();
        Ok(())
    }

    // ==================== STATS ====================

    pub async fn stats(&self, chat_id: i64, user_id: i64) -> Result<(), EngineError> {
        let (count, fav_count) = {
            let store = self.store.lock().await;
            (
                store.user_stats.get(&user_id).copied().unwrap_or(0),
                store.favorites.get(&user_id).map(|f| f.len()).unwrap_or(0),
            )
        };

        let rank = if count > 100 {
            "GIF Master"
        } else if count > 50 {
            "GIF Enthusiast"
        } else {
            "GIF Explorer"
        };

        let text = format!(
            "📊 **Your GIF Stats:**\n\n\
             🎬 GIFs requested: **{count}**\n\
             ⭐ Favorites saved: **{fav_count}**\n\
             🏆 Rank: **{rank}**"
        );
        self.chat.send_message(chat_id, &text).await.ok();
        Ok(())
    }

    // ==================== PASSIVE MODE ====================

    /// React to trigger keywords in plain group messages when the group
    /// has passive mode on. Only the first matching trigger fires.
    pub async fn passive_scan(&self, chat_id: i64, user_id: i64, text: &str) {
        let settings = { self.store.lock().await.settings(chat_id) };
        if !settings.passive_mode {
            return;
        }

        for (pattern, queries) in &self.triggers {
            if !pattern.is_match(text) {
                continue;
            }

            let query = queries.choose(&mut rand::rng()).copied().unwrap_or("funny");
            let urls = self.gifs.search(query, 5, settings.safe_mode).await;
            let picked = urls.choose(&mut rand::rng()).cloned();
            if let Some(url) = picked {
                info!("🤖 Passive trigger \"{}\" in chat {chat_id}", pattern.as_str());
                let caption = format!("🤖 *{query}*");
                self.chat.send_animation(chat_id, &url, &caption).await.ok();
                self.credit(user_id, 1).await;
            }
            break;
        }
    }
}
