use anyhow::Result;
use serenity::all::{
    CommandInteraction, CommandOptionType, Context as SerenityContext, CreateCommand,
    CreateCommandOption,
};

use super::{Args, Reply, defer, finish, guild_of, parse_timestamp, success, user_channel};
use crate::{
    error::{AudioError, LibraryError},
    state::AppState,
};

fn simple(name: &str, description: &str) -> CreateCommand {
    CreateCommand::new(name)
        .description(description)
        .dm_permission(false)
}

pub fn definitions() -> Vec<CreateCommand> {
    vec![
        simple("pause", "Pause the current song"),
        simple("resume", "Resume playback"),
        simple("seek", "Jump to a point in the current song").add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "timestamp",
                "Where to jump, like 1m30s, 90s or 1:30",
            )
            .required(true),
        ),
        simple("shuffle", "Shuffle the upcoming songs"),
        simple("clear", "Remove every upcoming song, keeping the current one"),
        simple("connect", "Join your voice channel"),
        simple("disconnect", "Leave the voice channel"),
    ]
}

pub async fn handle(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;
    let outcome = run(ctx, cmd, state).await;
    finish(ctx, cmd, outcome).await
}

async fn run(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<Reply, LibraryError> {
    let guild_id = guild_of(cmd)?;
    let audio = &state.audio;
    let embed = match cmd.data.name.as_str() {
        "pause" => {
            audio.pause(guild_id, true).await?;
            success("⏸️ Paused", "Use /resume to continue.")
        }
        "resume" => {
            audio.pause(guild_id, false).await?;
            state.presence.forget(guild_id);
            success("▶️ Resumed", "Playback continues.")
        }
        "seek" => {
            let raw = Args::new(&cmd.data.options).required_str("timestamp")?;
            let at = parse_timestamp(raw).ok_or_else(|| {
                LibraryError::invalid(format!("`{raw}` is not a timestamp. Try 1m30s, 90s or 1:30."))
            })?;
            audio.seek(guild_id, at).await?;
            success("⏩ Seeked", format!("Jumped to {}.", super::format_duration(at.as_millis() as i64)))
        }
        "shuffle" => {
            let n = audio.shuffle(guild_id).await?;
            success("🔀 Shuffled", format!("Shuffled {n} upcoming song(s)."))
        }
        "clear" => {
            let n = audio.clear(guild_id).await?;
            success("🧹 Cleared", format!("Removed {n} upcoming song(s)."))
        }
        "connect" => {
            let channel = user_channel(ctx, guild_id, cmd.user.id).ok_or(AudioError::NoVoiceChannel)?;
            audio.connect(guild_id, channel).await?;
            state.bridge.seed_session(guild_id, cmd.user.id.get()).await?;
            success("🔊 Connected", format!("Joined <#{channel}>."))
        }
        "disconnect" => {
            audio.disconnect(guild_id).await?;
            state.presence.forget(guild_id);
            success("👋 Disconnected", "Left the voice channel and cleared the queue.")
        }
        other => return Err(LibraryError::invalid(format!("Unknown command `{other}`."))),
    };
    Ok(Reply::embed(embed))
}
