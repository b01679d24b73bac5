use anyhow::Result;
use serenity::all::{CommandInteraction, Context as SerenityContext, CreateCommand};

use super::{Reply, defer, finish, guild_of, success};
use crate::{error::LibraryError, state::AppState};

pub fn definition() -> CreateCommand {
    CreateCommand::new("stop")
        .description("Stop playback and clear the queue")
        .dm_permission(false)
}

pub async fn handle(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;
    let outcome = run(cmd, state).await;
    finish(ctx, cmd, outcome).await
}

async fn run(cmd: &CommandInteraction, state: &AppState) -> Result<Reply, LibraryError> {
    let guild_id = guild_of(cmd)?;
    if state.audio.voice_channel(guild_id).await.is_none() {
        return Err(crate::error::AudioError::NotConnected.into());
    }
    state.audio.stop(guild_id).await?;
    Ok(Reply::embed(success("⏹️ Stopped", "Stopped playback and cleared the queue.")))
}
