use anyhow::Result;
use serenity::all::{
    CommandInteraction, CommandOptionType, Context as SerenityContext, CreateCommand,
    CreateCommandOption,
};

use super::{Args, Reply, defer, finish, guild_of, success};
use crate::{
    database::{
        models::member::MAX_VOLUME,
        types::{AutoplayMode, LoopMode},
    },
    error::LibraryError,
    state::AppState,
};

pub fn definitions() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("volume")
            .description("Set your playback volume")
            .dm_permission(false)
            .add_option(
                CreateCommandOption::new(CommandOptionType::Integer, "value", "Volume in percent")
                    .min_int_value(0)
                    .max_int_value(MAX_VOLUME as u64)
                    .required(true),
            ),
        CreateCommand::new("autoplay")
            .description("Choose what happens when the queue runs out")
            .dm_permission(false)
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "mode", "Autoplay mode")
                    .add_string_choice("Disabled", "disabled")
                    .add_string_choice("Partial", "partial")
                    .add_string_choice("Enabled", "enabled")
                    .required(true),
            ),
        CreateCommand::new("loop")
            .description("Repeat the current song or the whole queue")
            .dm_permission(false)
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "mode", "Loop mode")
                    .add_string_choice("Off", "normal")
                    .add_string_choice("Song", "single")
                    .add_string_choice("Queue", "all")
                    .required(true),
            ),
    ]
}

pub async fn handle(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;
    let outcome = run(cmd, state).await;
    finish(ctx, cmd, outcome).await
}

async fn run(cmd: &CommandInteraction, state: &AppState) -> Result<Reply, LibraryError> {
    let guild_id = guild_of(cmd)?;
    let user = cmd.user.id.get();
    let args = Args::new(&cmd.data.options);
    let embed = match cmd.data.name.as_str() {
        "volume" => {
            let raw = args.required_integer("value")?;
            let volume = i32::try_from(raw)
                .map_err(|_| LibraryError::invalid(format!("Volume must be between 0 and {MAX_VOLUME}.")))?;
            let member = state.bridge.set_volume(guild_id, user, volume).await?;
            success("🔊 Volume", format!("Volume set to **{}%**.", member.volume))
        }
        "autoplay" => {
            let mode: AutoplayMode = args
                .required_str("mode")?
                .parse()
                .map_err(|e: crate::database::types::ParseModeError| LibraryError::invalid(e.to_string()))?;
            let member = state.bridge.set_autoplay(guild_id, user, mode).await?;
            success("🎲 Autoplay", format!("Autoplay is now **{}**.", member.autoplay))
        }
        "loop" => {
            let mode: LoopMode = args
                .required_str("mode")?
                .parse()
                .map_err(|e: crate::database::types::ParseModeError| LibraryError::invalid(e.to_string()))?;
            let member = state.bridge.set_loop(guild_id, user, mode).await?;
            success("🔁 Loop", format!("Loop mode is now **{}**.", member.loop_mode))
        }
        other => return Err(LibraryError::invalid(format!("Unknown command `{other}`."))),
    };
    Ok(Reply::embed(embed))
}
