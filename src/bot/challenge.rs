//! Time-boxed GIF challenges, one per chat.
//!
//! A challenge collects one submission per participant until its timer
//! fires, then a uniformly random participant wins. Resolution is
//! idempotent: the timer firing, an explicit cancel, and an overwriting
//! restart may race, and whichever path finds the record already gone
//! treats that as done.

use chrono::Utc;
use rand::seq::IteratorRandom;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use crate::bot::error::EngineError;
use crate::bot::store::{persist, Challenge, Store};
use crate::bot::telegram::ChatPort;
use crate::bot::timer::{self, TimerHandle};

pub struct ChallengeEngine {
    store: Arc<Mutex<Store>>,
    snapshot_path: Option<PathBuf>,
    chat: Arc<dyn ChatPort>,
    /// Pending resolution timers, keyed by chat id.
    timers: Mutex<HashMap<i64, TimerHandle>>,
}

impl ChallengeEngine {
    pub fn new(
        store: Arc<Mutex<Store>>,
        snapshot_path: Option<PathBuf>,
        chat: Arc<dyn ChatPort>,
    ) -> Self {
        Self {
            store,
            snapshot_path,
            chat,
            timers: Mutex::new(HashMap::new()),
        }
    }

    /// Start a challenge, replacing any active one for the chat.
    ///
    /// The requested duration is clamped to the supported band. The prior
    /// challenge's timer is cancelled before the overwrite so an abandoned
    /// challenge can never double-fire.
    pub async fn start(
        self: &Arc<Self>,
        chat_id: i64,
        theme: &str,
        duration_secs: u64,
        creator_id: i64,
    ) -> Challenge {
        let duration_secs = timer::clamp_duration_secs(duration_secs);
        let end_time = Utc::now() + chrono::Duration::seconds(duration_secs as i64);

        // Disarm the prior challenge's timer before touching its record so
        // an abandoned challenge can never fire against the new one.
        if let Some(old) = self.timers.lock().await.remove(&chat_id) {
            old.cancel();
        }

        let challenge = Challenge {
            theme: theme.to_string(),
            creator_id,
            participants: HashMap::new(),
            end_time,
        };

        {
            let mut store = self.store.lock().await;
            if store.challenges.insert(chat_id, challenge.clone()).is_some() {
                info!("Challenge in chat {chat_id} replaced by a new one");
            }
            persist(&store, self.snapshot_path.as_deref());
        }

        self.arm(chat_id, Duration::from_secs(duration_secs)).await;

        info!(
            "🏆 Challenge \"{}\" started in chat {} ({}s)",
            challenge.theme, chat_id, duration_secs
        );
        challenge
    }

    /// Record a participant's submission. A later submission from the same
    /// user replaces the earlier one.
    pub async fn submit(
        &self,
        chat_id: i64,
        user_id: i64,
        animation: &str,
    ) -> Result<(), EngineError> {
        let mut store = self.store.lock().await;
        let challenge = store
            .challenges
            .get_mut(&chat_id)
            .ok_or_else(|| EngineError::NotFound("🏆 No active challenge here!".to_string()))?;

        challenge.participants.insert(user_id, animation.to_string());
        persist(&store, self.snapshot_path.as_deref());
        Ok(())
    }

    /// Cancel the chat's challenge. Only the creator or a chat admin may.
    pub async fn cancel(
        &self,
        chat_id: i64,
        requester_id: i64,
        requester_is_admin: bool,
    ) -> Result<(), EngineError> {
        {
            let mut store = self.store.lock().await;
            let challenge = store
                .challenges
                .get(&chat_id)
                .ok_or_else(|| EngineError::NotFound("🏆 No active challenge here!".to_string()))?;

            if challenge.creator_id != requester_id && !requester_is_admin {
                return Err(EngineError::Forbidden);
            }

            store.challenges.remove(&chat_id);
            persist(&store, self.snapshot_path.as_deref());
        }

        if let Some(handle) = self.timers.lock().await.remove(&chat_id) {
            handle.cancel();
        }

        info!("🏆 Challenge in chat {chat_id} cancelled");
        Ok(())
    }

    /// Timer-fired resolution. A missing record means the challenge was
    /// cancelled or already resolved; that is a silent no-op.
    pub async fn resolve(&self, chat_id: i64) {
        let challenge = {
            let mut store = self.store.lock().await;
            match store.challenges.remove(&chat_id) {
                Some(challenge) => {
                    persist(&store, self.snapshot_path.as_deref());
                    challenge
                }
                None => return,
            }
        };
        self.timers.lock().await.remove(&chat_id);

        if challenge.participants.is_empty() {
            info!("🏆 Challenge \"{}\" ended with no submissions", challenge.theme);
            let text = format!(
                "🏆 **Challenge over!**\nNo submissions for \"{}\" this time 😢",
                challenge.theme
            );
            self.chat.send_message(chat_id, &text).await.ok();
            return;
        }

        // Uniform random draw over the participant set.
        let winner = match challenge.participants.keys().choose(&mut rand::rng()) {
            Some(&id) => id,
            None => return,
        };
        let animation = &challenge.participants[&winner];

        let name = self
            .chat
            .member_display_name(chat_id, winner)
            .await
            .unwrap_or_else(|| format!("User {winner}"));

        info!(
            "🏆 Challenge \"{}\" winner: {} ({} entrant(s))",
            challenge.theme,
            name,
            challenge.participants.len()
        );

        let caption = format!(
            "🏆 **Challenge over!**\n*{}* wins \"{}\" 🎉",
            name, challenge.theme
        );
        self.chat.send_animation(chat_id, animation, &caption).await.ok();
    }

    /// Arm (or re-arm) the resolution timer for a chat.
    async fn arm(self: &Arc<Self>, chat_id: i64, delay: Duration) {
        let engine = self.clone();
        let handle = timer::schedule_once(delay, async move {
            engine.resolve(chat_id).await;
        });

        if let Some(old) = self.timers.lock().await.insert(chat_id, handle) {
            old.cancel();
        }
    }

    /// Re-arm timers for challenges found in the snapshot at startup.
    /// Challenges already past their end time resolve immediately.
    pub async fn rehydrate(self: &Arc<Self>) {
        let pending: Vec<_> = {
            let store = self.store.lock().await;
            store
                .challenges
                .iter()
                .map(|(&chat_id, challenge)| (chat_id, challenge.end_time))
                .collect()
        };

        if pending.is_empty() {
            return;
        }

        info!("Re-arming {} challenge timer(s)", pending.len());
        let now = Utc::now();
        for (chat_id, end_time) in pending {
            let delay = (end_time - now).to_std().unwrap_or(Duration::ZERO);
            self.arm(chat_id, delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testutil::MockChat;

    fn engine(chat: Arc<MockChat>) -> Arc<ChallengeEngine> {
        Arc::new(ChallengeEngine::new(
            Arc::new(Mutex::new(Store::new())),
            None,
            chat,
        ))
    }

    #[tokio::test]
    async fn test_start_clamps_short_duration() {
        let engine = engine(Arc::new(MockChat::new()));

        let before = Utc::now();
        let challenge = engine.start(-1, "speed", 5, 10).await;

        let secs = (challenge.end_time - before).num_seconds();
        assert!((29..=31).contains(&secs), "got {secs}s");
    }

    #[tokio::test]
    async fn test_start_clamps_long_duration() {
        let engine = engine(Arc::new(MockChat::new()));

        let before = Utc::now();
        let challenge = engine.start(-1, "marathon", 1_000_000, 10).await;

        let secs = (challenge.end_time - before).num_seconds();
        assert!(secs <= 86_401, "got {secs}s");
    }

    #[tokio::test]
    async fn test_one_challenge_per_chat() {
        let engine = engine(Arc::new(MockChat::new()));

        engine.start(-1, "first", 60, 10).await;
        engine.start(-1, "second", 60, 11).await;

        let store = engine.store.lock().await;
        assert_eq!(store.challenges.len(), 1);
        assert_eq!(store.challenges[&-1].theme, "second");
    }

    #[tokio::test]
    async fn test_resubmission_replaces_entry() {
        let engine = engine(Arc::new(MockChat::new()));
        engine.start(-1, "cats", 60, 10).await;

        engine.submit(-1, 20, "file-a").await.unwrap();
        engine.submit(-1, 20, "file-b").await.unwrap();

        let store = engine.store.lock().await;
        let participants = &store.challenges[&-1].participants;
        assert_eq!(participants.len(), 1);
        assert_eq!(participants[&20], "file-b");
    }

    #[tokio::test]
    async fn test_submit_without_challenge() {
        let engine = engine(Arc::new(MockChat::new()));

        let err = engine.submit(-1, 20, "file-a").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_requires_creator_or_admin() {
        let engine = engine(Arc::new(MockChat::new()));
        engine.start(-1, "cats", 60, 10).await;

        let err = engine.cancel(-1, 99, false).await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden));

        // Record untouched by the refused cancel
        assert_eq!(engine.store.lock().await.challenges[&-1].theme, "cats");

        engine.cancel(-1, 99, true).await.unwrap();
        assert!(engine.store.lock().await.challenges.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_by_creator() {
        let engine = engine(Arc::new(MockChat::new()));
        engine.start(-1, "cats", 60, 10).await;

        engine.cancel(-1, 10, false).await.unwrap();
        assert!(engine.store.lock().await.challenges.is_empty());

        let err = engine.cancel(-1, 10, false).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resolve_without_submissions() {
        let chat = Arc::new(MockChat::new());
        let engine = engine(chat.clone());
        engine.start(-1, "empty", 60, 10).await;

        engine.resolve(-1).await;

        assert!(engine.store.lock().await.challenges.is_empty());
        let messages = chat.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].1.contains("No submissions"));
    }

    #[tokio::test]
    async fn test_resolve_picks_single_winner() {
        let chat = Arc::new(MockChat::new());
        let engine = engine(chat.clone());
        engine.start(-1, "Summer", 60, 1).await;

        engine.submit(-1, 2, "A2").await.unwrap();
        engine.resolve(-1).await;

        // U2 is the only entrant, so U2 wins with A2
        let animations = chat.animations.lock().unwrap();
        assert_eq!(animations.len(), 1);
        assert_eq!(animations[0].1, "A2");
        assert!(animations[0].2.contains("Summer"));
        assert!(engine.store.lock().await.challenges.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_winner_among_many() {
        let chat = Arc::new(MockChat::new());
        let engine = engine(chat.clone());
        engine.start(-1, "pets", 60, 1).await;

        engine.submit(-1, 2, "A2").await.unwrap();
        engine.submit(-1, 3, "A3").await.unwrap();
        engine.submit(-1, 4, "A4").await.unwrap();
        engine.resolve(-1).await;

        let animations = chat.animations.lock().unwrap();
        assert_eq!(animations.len(), 1);
        assert!(["A2", "A3", "A4"].contains(&animations[0].1.as_str()));
    }

    #[tokio::test]
    async fn test_resolve_twice_is_noop() {
        let chat = Arc::new(MockChat::new());
        let engine = engine(chat.clone());
        engine.start(-1, "cats", 60, 1).await;
        engine.submit(-1, 2, "A2").await.unwrap();

        engine.resolve(-1).await;
        engine.resolve(-1).await;

        assert_eq!(chat.animations.lock().unwrap().len(), 1);
        assert_eq!(chat.messages.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_resolve_after_cancel_is_noop() {
        let chat = Arc::new(MockChat::new());
        let engine = engine(chat.clone());
        engine.start(-1, "cats", 60, 10).await;

        engine.cancel(-1, 10, false).await.unwrap();
        engine.resolve(-1).await;

        assert!(chat.messages.lock().unwrap().is_empty());
        assert!(chat.animations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_winner_announced_by_display_name() {
        let chat = {
            let mut chat = MockChat::new();
            chat.names.insert(42, "Alice".to_string());
            Arc::new(chat)
        };
        let engine = engine(chat.clone());
        engine.start(-1, "cats", 60, 1).await;
        engine.submit(-1, 42, "A42").await.unwrap();

        engine.resolve(-1).await;

        let animations = chat.animations.lock().unwrap();
        assert!(animations[0].2.contains("Alice"));
    }

    #[tokio::test]
    async fn test_winner_name_falls_back_to_synthetic_label() {
        // MockChat::new() knows no display names
        let chat = Arc::new(MockChat::new());
        let engine = engine(chat.clone());
        engine.start(-1, "cats", 60, 1).await;
        engine.submit(-1, 42, "A42").await.unwrap();

        engine.resolve(-1).await;

        let animations = chat.animations.lock().unwrap();
        assert!(animations[0].2.contains("User 42"));
    }
}
