use anyhow::Result;
use serenity::all::{
    CommandInteraction, CommandOptionType, Context as SerenityContext, CreateCommand,
    CreateCommandOption, CreateEmbed,
};

use super::{Args, Reply, defer, finish, format_duration, guild_of, success, user_channel};
use crate::{
    bridge::{Placement, Queued},
    error::LibraryError,
    state::AppState,
};

pub fn definition(name: &str, description: &str) -> CreateCommand {
    let opt = CreateCommandOption::new(CommandOptionType::String, "query", "Song title or URL")
        .required(true);
    CreateCommand::new(name)
        .description(description)
        .dm_permission(false)
        .add_option(opt)
}

fn placement(command: &str) -> Placement {
    match command {
        "playnext" => Placement::Next,
        "playskip" => Placement::Skip,
        _ => Placement::End,
    }
}

pub async fn handle(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;
    let outcome = run(ctx, cmd, state).await;
    finish(ctx, cmd, outcome).await
}

async fn run(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<Reply, LibraryError> {
    let guild_id = guild_of(cmd)?;
    state
        .settings
        .check_music_channel(guild_id.get(), cmd.channel_id.get())
        .await?;
    let query = Args::new(&cmd.data.options).required_str("query")?;
    let channel = user_channel(ctx, guild_id, cmd.user.id);
    let placement = placement(&cmd.data.name);

    let queued = state
        .bridge
        .play_query(guild_id, cmd.user.id.get(), channel, query, placement)
        .await?;
    Ok(Reply::embed(describe(&queued, placement)))
}

fn describe(queued: &Queued, placement: Placement) -> CreateEmbed {
    match queued {
        Queued::Track { track, started } => {
            let title = if *started {
                "▶️ Now Playing"
            } else {
                match placement {
                    Placement::End => "➕ Queued",
                    Placement::Next => "⏭️ Playing Next",
                    Placement::Skip => "▶️ Now Playing",
                }
            };
            let mut embed = success(title, format!("[{}]({})", track.title, track.url));
            if let Some(artist) = &track.artist {
                embed = embed.field("Artist", artist, true);
            }
            if track.duration_ms > 0 {
                embed = embed.field("Duration", format_duration(track.duration_ms), true);
            }
            embed
        }
        Queued::Playlist { name, count, started } => success(
            if *started { "▶️ Playing Playlist" } else { "➕ Queued Playlist" },
            format!("Added {count} track(s) from **{name}**."),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_names_pick_the_placement() {
        assert_eq!(placement("play"), Placement::End);
        assert_eq!(placement("playnext"), Placement::Next);
        assert_eq!(placement("playskip"), Placement::Skip);
    }
}
