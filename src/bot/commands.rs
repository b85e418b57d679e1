//! Slash command definitions and argument helpers.

use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Welcome message and feature overview")]
    Start,
    #[command(description = "Detailed command help")]
    Help,
    #[command(description = "Search GIFs: /s query [n]")]
    S(String),
    #[command(description = "Random GIF: /r query")]
    R(String),
    #[command(description = "Top trending GIFs")]
    Trending,
    #[command(description = "Favorites: /fav add|list|remove n")]
    Fav(String),
    #[command(description = "Label a GIF: /label keyword (reply to a GIF)")]
    Label(String),
    #[command(description = "Send a labeled GIF: /gif [keyword]")]
    Gif(String),
    #[command(description = "Start a challenge: /challenge seconds theme")]
    Challenge(String),
    #[command(description = "Submit a challenge entry (reply to a GIF)")]
    Entry,
    #[command(description = "Cancel the challenge (creator or admin)")]
    Endchallenge,
    #[command(description = "Schedule a post: /schedule HH:MM query")]
    Schedule(String),
    #[command(description = "Motivational quote + GIF: /quote [query]")]
    Quote(String),
    #[command(description = "Completely random GIF")]
    Random,
    #[command(description = "Toggle passive mode (admin)")]
    Toggle,
    #[command(description = "Default GIF count: /setmax 1-5 (admin)")]
    Setmax(String),
    #[command(description = "Toggle safe mode (admin)")]
    Safe,
    #[command(description = "Your GIF usage stats")]
    Stats,
}

/// Split `/s` arguments into a query and an optional trailing count.
///
/// A trailing all-digit token is the count; a bare number with no query
/// is not a search. Returns `None` when no query remains.
pub fn split_query_count(args: &str) -> Option<(String, Option<usize>)> {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    let (last, rest) = tokens.split_last()?;

    if last.chars().all(|c| c.is_ascii_digit()) {
        if rest.is_empty() {
            return None;
        }
        let count = last.parse().ok()?;
        Some((rest.join(" "), Some(count)))
    } else {
        Some((tokens.join(" "), None))
    }
}
