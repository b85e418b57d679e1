mod bot;
mod config;

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ChatKind;
use tracing::info;
use tracing_subscriber::prelude::*;

use bot::store::Store;
use bot::{ChatPort, Command, GifBotEngine, TelegramClient, TenorClient};
use config::Config;

struct BotState {
    engine: GifBotEngine,
    telegram: Arc<TelegramClient>,
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "gifgram.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("gifgram.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting gifgram...");
    info!("Loaded config from {config_path}");

    let telegram = Arc::new(TelegramClient::new(bot.clone()));
    let tenor = Arc::new(TenorClient::new(config.tenor_api_key.clone()));

    let snapshot_path = config.snapshot_path();
    let store = Arc::new(tokio::sync::Mutex::new(Store::load_or_new(&snapshot_path)));

    let engine = GifBotEngine::new(store, Some(snapshot_path), telegram.clone(), tenor);

    // Re-arm pending challenges and scheduled posts from the snapshot;
    // overdue ones fire immediately.
    engine.rehydrate().await;

    let state = Arc::new(BotState { engine, telegram });

    let handler = Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(dptree::endpoint(handle_text));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_command(msg: Message, cmd: Command, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(ref user) = msg.from else {
        return Ok(());
    };
    let chat_id = msg.chat.id.0;
    let user_id = user.id.0 as i64;
    let reply_file = reply_animation_id(&msg);

    let result = match cmd {
        Command::Start => {
            state.engine.welcome(chat_id).await;
            Ok(())
        }
        Command::Help => {
            state.engine.help(chat_id).await;
            Ok(())
        }
        Command::S(args) => state.engine.search(chat_id, user_id, &args).await,
        Command::R(args) => state.engine.random(chat_id, user_id, &args).await,
        Command::Trending => state.engine.trending(chat_id, user_id).await,
        Command::Fav(args) => {
            state
                .engine
                .favorites(chat_id, user_id, &args, reply_file.as_deref())
                .await
        }
        Command::Label(args) => {
            state
                .engine
                .label(chat_id, user_id, &args, reply_file.as_deref())
                .await
        }
        Command::Gif(args) => state.engine.quick_gif(chat_id, user_id, &args).await,
        Command::Challenge(args) => state.engine.challenge_start(chat_id, user_id, &args).await,
        Command::Entry => {
            state
                .engine
                .challenge_entry(chat_id, user_id, reply_file.as_deref())
                .await
        }
        Command::Endchallenge => {
            let admin = is_admin(&msg, &state).await;
            state.engine.challenge_end(chat_id, user_id, admin).await
        }
        Command::Schedule(args) => state.engine.schedule(chat_id, user_id, &args).await,
        Command::Quote(args) => state.engine.quote(chat_id, user_id, &args).await,
        Command::Random => state.engine.random_topic(chat_id, user_id).await,
        Command::Toggle => {
            let admin = is_admin(&msg, &state).await;
            state.engine.toggle_passive(chat_id, admin).await
        }
        Command::Setmax(args) => {
            let admin = is_admin(&msg, &state).await;
            state.engine.set_max_gifs(chat_id, admin, &args).await
        }
        Command::Safe => {
            let admin = is_admin(&msg, &state).await;
            state.engine.toggle_safe_mode(chat_id, admin).await
        }
        Command::Stats => state.engine.stats(chat_id, user_id).await,
    };

    if let Err(e) = result {
        state.telegram.send_message(chat_id, &e.to_string()).await.ok();
    }

    Ok(())
}

async fn handle_text(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let is_group = matches!(msg.chat.kind, ChatKind::Public(_));
    if !is_group {
        return Ok(());
    }

    let Some(ref user) = msg.from else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    state
        .engine
        .passive_scan(msg.chat.id.0, user.id.0 as i64, text)
        .await;

    Ok(())
}

/// Animation file id of the replied-to message, if any.
fn reply_animation_id(msg: &Message) -> Option<String> {
    msg.reply_to_message()
        .and_then(|reply| reply.animation())
        .map(|animation| animation.file.id.0.clone())
}

/// Admins can manage group settings; private chats are their own admin.
async fn is_admin(msg: &Message, state: &BotState) -> bool {
    if matches!(msg.chat.kind, ChatKind::Private(_)) {
        return true;
    }
    let Some(ref user) = msg.from else {
        return false;
    };
    state
        .telegram
        .is_admin(msg.chat.id.0, user.id.0 as i64)
        .await
}
