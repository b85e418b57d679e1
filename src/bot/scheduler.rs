//! One-shot scheduled GIF posts.
//!
//! A post is scheduled for a wall-clock time of day; if that time has
//! already passed today it goes to the same time tomorrow. The search
//! query is resolved when the timer fires, not when the post is created,
//! so results reflect what the provider has at fire time.

use chrono::{Local, NaiveDateTime, Utc};
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use crate::bot::error::EngineError;
use crate::bot::store::{persist, ScheduledPost, Store};
use crate::bot::telegram::ChatPort;
use crate::bot::tenor::GifProvider;
use crate::bot::timer::{self, TimerHandle};

/// How many candidates to fetch when a post fires; one is picked at random.
const FIRE_SEARCH_LIMIT: usize = 5;

/// Parse a strict 24-hour `HH:MM` time of day.
///
/// The hour may be one or two digits, the minute must be two. Anything
/// else is a validation error and nothing is mutated.
pub fn parse_hhmm(input: &str) -> Result<(u32, u32), EngineError> {
    let invalid = || {
        EngineError::Validation(format!(
            "⏰ Invalid time \"{input}\" — use HH:MM (24-hour)"
        ))
    };

    let (hour_str, minute_str) = input.split_once(':').ok_or_else(invalid)?;

    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    if !digits(hour_str) || hour_str.len() > 2 || minute_str.len() != 2 || !digits(minute_str) {
        return Err(invalid());
    }

    let hour: u32 = hour_str.parse().map_err(|_| invalid())?;
    let minute: u32 = minute_str.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }

    Ok((hour, minute))
}

/// Next occurrence of `hour:minute` strictly after `now`: today if still
/// ahead, otherwise the same time tomorrow.
pub fn fire_time_for(hour: u32, minute: u32, now: NaiveDateTime) -> NaiveDateTime {
    // hour/minute come validated from parse_hhmm
    let mut target = now.date().and_hms_opt(hour, minute, 0).unwrap_or(now);
    if target <= now {
        target += chrono::Duration::days(1);
    }
    target
}

pub struct SchedulerEngine {
    store: Arc<Mutex<Store>>,
    snapshot_path: Option<PathBuf>,
    chat: Arc<dyn ChatPort>,
    gifs: Arc<dyn GifProvider>,
    /// Pending fire timers, keyed by post id.
    timers: Mutex<HashMap<String, TimerHandle>>,
}

impl SchedulerEngine {
    pub fn new(
        store: Arc<Mutex<Store>>,
        snapshot_path: Option<PathBuf>,
        chat: Arc<dyn ChatPort>,
        gifs: Arc<dyn GifProvider>,
    ) -> Self {
        Self {
            store,
            snapshot_path,
            chat,
            gifs,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Validate, record and arm a scheduled post.
    pub async fn schedule(
        self: &Arc<Self>,
        chat_id: i64,
        time_str: &str,
        query: &str,
        requester_id: i64,
    ) -> Result<ScheduledPost, EngineError> {
        let (hour, minute) = parse_hhmm(time_str)?;
        if query.trim().is_empty() {
            return Err(EngineError::Validation(
                "⏰ Usage: /schedule HH:MM <search query>".to_string(),
            ));
        }

        let now = Local::now().naive_local();
        let target = fire_time_for(hour, minute, now);
        let delay = (target - now).to_std().unwrap_or(Duration::ZERO);
        let fire_at =
            Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

        let (id, post) = {
            let mut store = self.store.lock().await;
            let id = store.next_post_id(chat_id);
            let post = ScheduledPost {
                chat_id,
                query: query.trim().to_string(),
                fire_at,
                requester_id,
            };
            store.scheduled_posts.insert(id.clone(), post.clone());
            persist(&store, self.snapshot_path.as_deref());
            (id, post)
        };

        self.arm(id.clone(), delay).await;

        info!(
            "⏰ Scheduled post {} for {} (\"{}\")",
            id,
            target.format("%Y-%m-%d %H:%M"),
            post.query
        );
        Ok(post)
    }

    /// Remove a pending post and disarm its timer. Not exposed as a user
    /// command; used by tests and operator tooling.
    pub async fn cancel(&self, post_id: &str) -> Result<(), EngineError> {
        {
            let mut store = self.store.lock().await;
            store
                .scheduled_posts
                .remove(post_id)
                .ok_or_else(|| EngineError::NotFound(format!("no scheduled post {post_id}")))?;
            persist(&store, self.snapshot_path.as_deref());
        }

        if let Some(handle) = self.timers.lock().await.remove(post_id) {
            handle.cancel();
        }
        Ok(())
    }

    /// Timer-fired delivery. A missing record means the post was cancelled
    /// or already fired; that is a silent no-op. The record is removed
    /// whatever the delivery outcome — fired posts are never retried.
    pub async fn fire(&self, post_id: &str) {
        let post = {
            let mut store = self.store.lock().await;
            match store.scheduled_posts.remove(post_id) {
                Some(post) => {
                    persist(&store, self.snapshot_path.as_deref());
                    post
                }
                None => return,
            }
        };
        self.timers.lock().await.remove(post_id);

        let safe_mode = { self.store.lock().await.settings(post.chat_id).safe_mode };
        let urls = self
            .gifs
            .search(&post.query, FIRE_SEARCH_LIMIT, safe_mode)
            .await;

        let Some(url) = urls.choose(&mut rand::rng()) else {
            info!("⏰ Scheduled post {post_id}: no results for \"{}\"", post.query);
            let text = format!(
                "⏰ **Scheduled GIF failed:** No results for \"{}\"",
                post.query
            );
            self.chat.send_message(post.chat_id, &text).await.ok();
            return;
        };

        let caption = format!("⏰ **Scheduled GIF:** *{}*", post.query);
        if self
            .chat
            .send_animation(post.chat_id, url, &caption)
            .await
            .is_ok()
        {
            let mut store = self.store.lock().await;
            store.credit_user(post.requester_id, 1);
            persist(&store, self.snapshot_path.as_deref());
        }
    }

    async fn arm(self: &Arc<Self>, post_id: String, delay: Duration) {
        let engine = self.clone();
        let id = post_id.clone();
        let handle = timer::schedule_once(delay, async move {
            engine.fire(&id).await;
        });

        if let Some(old) = self.timers.lock().await.insert(post_id, handle) {
            old.cancel();
        }
    }

    /// Re-arm timers for posts found in the snapshot at startup. Posts
    /// whose fire time already passed fire immediately.
    pub async fn rehydrate(self: &Arc<Self>) {
        let pending: Vec<_> = {
            let store = self.store.lock().await;
            store
                .scheduled_posts
                .iter()
                .map(|(id, post)| (id.clone(), post.fire_at))
                .collect()
        };

        if pending.is_empty() {
            return;
        }

        info!("Re-arming {} scheduled post(s)", pending.len());
        let now = Utc::now();
        for (id, fire_at) in pending {
            let delay = (fire_at - now).to_std().unwrap_or(Duration::ZERO);
            self.arm(id, delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testutil::{MockChat, MockGifs};
    use chrono::NaiveDate;
    use tokio::time::sleep;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 6)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn engine(chat: Arc<MockChat>, gifs: Arc<MockGifs>) -> Arc<SchedulerEngine> {
        Arc::new(SchedulerEngine::new(
            Arc::new(Mutex::new(Store::new())),
            None,
            chat,
            gifs,
        ))
    }

    #[test]
    fn test_parse_valid_times() {
        assert_eq!(parse_hhmm("09:00").unwrap(), (9, 0));
        assert_eq!(parse_hhmm("9:05").unwrap(), (9, 5));
        assert_eq!(parse_hhmm("23:59").unwrap(), (23, 59));
        assert_eq!(parse_hhmm("0:00").unwrap(), (0, 0));
    }

    #[test]
    fn test_parse_rejects_malformed_times() {
        for input in ["25:00", "12:60", "9:5", "abc", "12:ab", "", ":30", "12:", "1 2:30", "+9:05"] {
            let err = parse_hhmm(input).unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)), "accepted {input:?}");
        }
    }

    #[test]
    fn test_fire_time_past_goes_to_tomorrow() {
        // 09:00 requested at 10:00 fires tomorrow at 09:00
        let target = fire_time_for(9, 0, at(10, 0));
        assert_eq!(target, at(9, 0) + chrono::Duration::days(1));
    }

    #[test]
    fn test_fire_time_ahead_stays_today() {
        // 09:00 requested at 08:00 fires today at 09:00
        let target = fire_time_for(9, 0, at(8, 0));
        assert_eq!(target, at(9, 0));
    }

    #[test]
    fn test_fire_time_exact_now_goes_to_tomorrow() {
        let target = fire_time_for(9, 0, at(9, 0));
        assert_eq!(target, at(9, 0) + chrono::Duration::days(1));
    }

    #[tokio::test]
    async fn test_schedule_records_post() {
        let engine = engine(Arc::new(MockChat::new()), Arc::new(MockGifs::new()));

        let post = engine.schedule(-1, "23:59", "celebration", 7).await.unwrap();
        assert_eq!(post.query, "celebration");
        assert_eq!(post.requester_id, 7);
        assert!(post.fire_at > Utc::now());

        let store = engine.store.lock().await;
        assert_eq!(store.scheduled_posts.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_time_creates_no_record() {
        let engine = engine(Arc::new(MockChat::new()), Arc::new(MockGifs::new()));

        assert!(engine.schedule(-1, "25:00", "rain", 7).await.is_err());
        assert!(engine.schedule(-1, "9:5", "rain", 7).await.is_err());
        assert!(engine.schedule(-1, "abc", "rain", 7).await.is_err());

        assert!(engine.store.lock().await.scheduled_posts.is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let engine = engine(Arc::new(MockChat::new()), Arc::new(MockGifs::new()));

        let err = engine.schedule(-1, "12:00", "   ", 7).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(engine.store.lock().await.scheduled_posts.is_empty());
    }

    #[tokio::test]
    async fn test_fire_delivers_and_credits() {
        let chat = Arc::new(MockChat::new());
        let gifs = Arc::new(MockGifs::with_result("rain", &["https://t.example/rain.gif"]));
        let engine = engine(chat.clone(), gifs);

        let id = {
            let mut store = engine.store.lock().await;
            let id = store.next_post_id(-1);
            store.scheduled_posts.insert(
                id.clone(),
                ScheduledPost {
                    chat_id: -1,
                    query: "rain".to_string(),
                    fire_at: Utc::now(),
                    requester_id: 7,
                },
            );
            id
        };

        engine.fire(&id).await;

        let animations = chat.animations.lock().unwrap();
        assert_eq!(animations.len(), 1);
        assert_eq!(animations[0].1, "https://t.example/rain.gif");

        let store = engine.store.lock().await;
        assert!(store.scheduled_posts.is_empty());
        assert_eq!(store.user_stats[&7], 1);
    }

    #[tokio::test]
    async fn test_fire_with_no_results_notifies_without_credit() {
        let chat = Arc::new(MockChat::new());
        let engine = engine(chat.clone(), Arc::new(MockGifs::new()));

        let id = {
            let mut store = engine.store.lock().await;
            let id = store.next_post_id(-1);
            store.scheduled_posts.insert(
                id.clone(),
                ScheduledPost {
                    chat_id: -1,
                    query: "rain".to_string(),
                    fire_at: Utc::now(),
                    requester_id: 7,
                },
            );
            id
        };

        engine.fire(&id).await;

        let messages = chat.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.contains("No results"));

        let store = engine.store.lock().await;
        assert!(store.scheduled_posts.is_empty());
        assert!(store.user_stats.is_empty());
    }

    #[tokio::test]
    async fn test_fire_unknown_id_is_noop() {
        let chat = Arc::new(MockChat::new());
        let engine = engine(chat.clone(), Arc::new(MockGifs::new()));

        engine.fire("-1_99").await;

        assert!(chat.messages.lock().unwrap().is_empty());
        assert!(chat.animations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_removes_record() {
        let engine = engine(Arc::new(MockChat::new()), Arc::new(MockGifs::new()));
        engine.schedule(-1, "23:59", "rain", 7).await.unwrap();

        let id = {
            let store = engine.store.lock().await;
            store.scheduled_posts.keys().next().unwrap().clone()
        };

        engine.cancel(&id).await.unwrap();
        assert!(engine.store.lock().await.scheduled_posts.is_empty());

        let err = engine.cancel(&id).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rehydrate_fires_overdue_posts() {
        let chat = Arc::new(MockChat::new());
        let gifs = Arc::new(MockGifs::with_result("rain", &["https://t.example/rain.gif"]));
        let engine = engine(chat.clone(), gifs);

        {
            let mut store = engine.store.lock().await;
            let id = store.next_post_id(-1);
            store.scheduled_posts.insert(
                id,
                ScheduledPost {
                    chat_id: -1,
                    query: "rain".to_string(),
                    fire_at: Utc::now() - chrono::Duration::hours(1),
                    requester_id: 7,
                },
            );
        }

        engine.rehydrate().await;
        sleep(Duration::from_millis(80)).await;

        assert_eq!(chat.animations.lock().unwrap().len(), 1);
        assert!(engine.store.lock().await.scheduled_posts.is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_for_passed_time_fires_next_day() {
        // "14:00" requested at 14:05 must be nearly 24h out
        let now = at(14, 5);
        let target = fire_time_for(14, 0, now);
        let delta = target - now;
        assert_eq!(delta, chrono::Duration::minutes(23 * 60 + 55));
    }
}
