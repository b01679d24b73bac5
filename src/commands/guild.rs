use anyhow::Result;
use serenity::all::{
    ChannelType, CommandInteraction, CommandOptionType, Context as SerenityContext, CreateCommand,
    CreateCommandOption, Permissions,
};

use super::{Args, Reply, defer, finish, guild_of, success};
use crate::{error::LibraryError, state::AppState};

pub fn definition() -> CreateCommand {
    CreateCommand::new("guild")
        .description("Server music settings")
        .dm_permission(false)
        .default_member_permissions(Permissions::MANAGE_GUILD)
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "always-online",
                "Stay in voice even when idle",
            )
            .add_sub_option(
                CreateCommandOption::new(CommandOptionType::Boolean, "enabled", "On or off")
                    .required(true),
            ),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "music-channel",
                "Limit play commands to one text channel (omit to allow all)",
            )
            .add_sub_option(
                CreateCommandOption::new(CommandOptionType::Channel, "channel", "Text channel")
                    .channel_types(vec![ChannelType::Text]),
            ),
        )
}

pub async fn handle(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;
    let outcome = run(cmd, state).await;
    finish(ctx, cmd, outcome).await
}

async fn run(cmd: &CommandInteraction, state: &AppState) -> Result<Reply, LibraryError> {
    let guild_id = guild_of(cmd)?;
    let allowed = cmd
        .member
        .as_ref()
        .and_then(|m| m.permissions)
        .is_some_and(|p| p.manage_guild());
    if !allowed {
        return Err(LibraryError::OwnershipViolation(
            "You need the Manage Server permission for this.".to_string(),
        ));
    }

    let (sub, args) = Args::new(&cmd.data.options)
        .subcommand()
        .ok_or_else(|| LibraryError::invalid("Pick a guild subcommand."))?;
    let embed = match sub {
        "always-online" => {
            let enabled = args
                .boolean("enabled")
                .ok_or_else(|| LibraryError::invalid("Missing `enabled`."))?;
            state.settings.set_always_online(guild_id.get(), enabled).await?;
            success(
                "🌙 Always Online",
                if enabled {
                    "I'll stay in voice even when the queue is empty."
                } else {
                    "I'll leave voice after a while with nothing to play."
                },
            )
        }
        "music-channel" => {
            let channel = args.channel("channel");
            state
                .settings
                .set_music_channel(guild_id.get(), channel.map(|c| c.get()))
                .await?;
            match channel {
                Some(c) => success("🎵 Music Channel", format!("Play commands now only work in <#{c}>.")),
                None => success("🎵 Music Channel", "Play commands work in every channel."),
            }
        }
        other => return Err(LibraryError::invalid(format!("Unknown subcommand `{other}`."))),
    };
    Ok(Reply::embed(embed))
}
