use anyhow::Result;
use serenity::all::{CommandInteraction, Context as SerenityContext, CreateCommand};

use super::{Reply, defer, finish, guild_of, success};
use crate::{error::LibraryError, state::AppState};

pub fn definition() -> CreateCommand {
    CreateCommand::new("skip")
        .description("Skip to the next queued track")
        .dm_permission(false)
}

pub async fn handle(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;
    let outcome = run(cmd, state).await;
    finish(ctx, cmd, outcome).await
}

async fn run(cmd: &CommandInteraction, state: &AppState) -> Result<Reply, LibraryError> {
    let guild_id = guild_of(cmd)?;
    let remaining = state.audio.skip(guild_id).await?;
    let embed = if remaining == 0 {
        success("⏭️ Queue Ended", "Skipped the last song. The queue is now empty.")
    } else {
        success(
            "⏭️ Skipped to Next",
            format!("Now playing the next song. {remaining} song(s) remaining in queue."),
        )
    };
    Ok(Reply::embed(embed))
}
