use anyhow::Result;
use serenity::all::{
    CommandInteraction, CommandOptionType, Context as SerenityContext, CreateCommand,
    CreateCommandOption,
};

use super::{
    Args, Reply, defer, finish,
    playlist::{playlist_name_option, save_queue},
    success,
};
use crate::{error::LibraryError, library::MoveMode, state::AppState};

fn sub(name: &str, description: &str) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::SubCommand, name, description)
        .add_sub_option(playlist_name_option())
}

fn index_option(name: &str, description: &str) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::Integer, name, description)
        .min_int_value(1)
        .required(true)
}

pub fn definition() -> CreateCommand {
    CreateCommand::new("song")
        .description("Manage the songs in your playlists")
        .dm_permission(false)
        .add_option(sub(
            "current",
            "Save the current queue into a playlist, replacing its songs",
        ))
        .add_option(
            sub("add", "Add a song by title or URL").add_sub_option(
                CreateCommandOption::new(CommandOptionType::String, "query", "Song title or URL")
                    .required(true),
            ),
        )
        .add_option(sub("remove", "Remove a song").add_sub_option(index_option("index", "Song number")))
        .add_option(
            sub("move", "Move a song")
                .add_sub_option(index_option("from", "Song number to move"))
                .add_sub_option(index_option("to", "Song number to move it next to"))
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::String, "mode", "Before or after the target")
                        .add_string_choice("Before", "before")
                        .add_string_choice("After", "after"),
                ),
        )
        .add_option(sub("clear", "Remove every song"))
}

pub async fn handle(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;
    let outcome = run(cmd, state).await;
    finish(ctx, cmd, outcome).await
}

async fn run(cmd: &CommandInteraction, state: &AppState) -> Result<Reply, LibraryError> {
    let (sub, args) = Args::new(&cmd.data.options)
        .subcommand()
        .ok_or_else(|| LibraryError::invalid("Pick a song subcommand."))?;
    let me = cmd.user.id.get();
    let playlist = args.required_str("playlist_name")?;
    let library = &state.library;

    let embed = match sub {
        "current" => return save_queue(cmd, args, state).await,
        "add" => {
            let added = library.add_track(me, playlist, args.required_str("query")?).await?;
            let text = match added.as_slice() {
                [one] => format!("Added **{}** to **{}**.", one.title, playlist.trim()),
                many => format!("Added {} songs to **{}**.", many.len(), playlist.trim()),
            };
            success("➕ Song Added", text)
        }
        "remove" => {
            let track = library
                .remove_track(me, playlist, args.required_integer("index")?)
                .await?;
            success(
                "➖ Song Removed",
                format!("Removed **{}** from **{}**.", track.title, playlist.trim()),
            )
        }
        "move" => {
            let mode = match args.str("mode") {
                Some(raw) => raw.parse::<MoveMode>().map_err(LibraryError::invalid)?,
                None => MoveMode::default(),
            };
            let from = args.required_integer("from")?;
            let to = args.required_integer("to")?;
            library.move_track(me, playlist, from, to, mode).await?;
            success(
                "↕️ Song Moved",
                format!("Moved song {from} {mode} song {to} in **{}**.", playlist.trim()),
            )
        }
        "clear" => {
            let n = library.clear(me, playlist).await?;
            success(
                "🧹 Playlist Cleared",
                format!("Removed {n} song(s) from **{}**.", playlist.trim()),
            )
        }
        other => return Err(LibraryError::invalid(format!("Unknown subcommand `{other}`."))),
    };
    Ok(Reply::embed(embed))
}
