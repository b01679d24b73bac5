use anyhow::Result;
use serenity::all::{
    CommandInteraction, CommandOptionType, Context as SerenityContext, CreateAttachment,
    CreateCommand, CreateCommandOption, CreateEmbed,
};

use super::{
    Args, Page, Reply, defer, finish, format_duration, guild_of, info, page_option, success,
    user_channel,
};
use crate::{
    audio,
    error::LibraryError,
    library::{Delivery, MAX_DESCRIPTION_LEN, PlaylistSummary, PlaylistView},
    state::AppState,
};

/// Uploaded playlist files beyond this are refused before download.
const IMPORT_FILE_LIMIT: u32 = 2 * 1024 * 1024;
const LIST_PAGE: usize = 10;
const VIEW_PAGE: usize = 10;

pub(super) fn playlist_name_option() -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::String, "playlist_name", "One of your playlists")
        .set_autocomplete(true)
        .required(true)
}

fn member_option() -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::User, "member", "Whose playlist (default: yours)")
}

fn description_option() -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::String, "description", "What it is for")
        .max_length(MAX_DESCRIPTION_LEN as u16)
}

fn sub(name: &str, description: &str) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::SubCommand, name, description)
}

pub fn definition() -> CreateCommand {
    CreateCommand::new("playlist")
        .description("Manage saved playlists")
        .dm_permission(false)
        .add_option(
            sub("list", "List playlists")
                .add_sub_option(member_option())
                .add_sub_option(page_option()),
        )
        .add_option(
            sub("create", "Create a playlist")
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::String, "name", "Playlist name")
                        .max_length(100)
                        .required(true),
                )
                .add_sub_option(description_option())
                .add_sub_option(CreateCommandOption::new(
                    CommandOptionType::Boolean,
                    "public",
                    "Whether others may view and play it (default: yes)",
                )),
        )
        .add_option(
            sub("edit", "Change a playlist's description or visibility")
                .add_sub_option(playlist_name_option())
                .add_sub_option(description_option())
                .add_sub_option(CreateCommandOption::new(
                    CommandOptionType::Boolean,
                    "clear_description",
                    "Remove the description",
                ))
                .add_sub_option(CreateCommandOption::new(
                    CommandOptionType::Boolean,
                    "public",
                    "Whether others may view and play it",
                )),
        )
        .add_option(
            sub("rename", "Rename a playlist")
                .add_sub_option(playlist_name_option())
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::String, "new_name", "New name")
                        .max_length(100)
                        .required(true),
                ),
        )
        .add_option(sub("delete", "Delete a playlist").add_sub_option(playlist_name_option()))
        .add_option(
            sub("view", "Show the songs in a playlist")
                .add_sub_option(playlist_name_option())
                .add_sub_option(member_option())
                .add_sub_option(page_option()),
        )
        .add_option(sub("export", "Get a code to share a playlist").add_sub_option(playlist_name_option()))
        .add_option(
            sub("import", "Create a playlist from a shared code")
                .add_sub_option(CreateCommandOption::new(
                    CommandOptionType::String,
                    "name",
                    "Name for the new playlist (default: the exported name)",
                ))
                .add_sub_option(CreateCommandOption::new(
                    CommandOptionType::String,
                    "data",
                    "The exported code",
                ))
                .add_sub_option(CreateCommandOption::new(
                    CommandOptionType::Attachment,
                    "file",
                    "An exported playlist.txt",
                )),
        )
        .add_option(
            sub("play", "Queue every song of a playlist")
                .add_sub_option(playlist_name_option())
                .add_sub_option(member_option())
                .add_sub_option(CreateCommandOption::new(
                    CommandOptionType::Boolean,
                    "shuffled",
                    "Shuffle before queueing",
                )),
        )
        .add_option(
            sub("save", "Save the current queue into a playlist, replacing its songs (same as /song current)")
                .add_sub_option(playlist_name_option()),
        )
}

pub async fn handle(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;
    let outcome = run(ctx, cmd, state).await;
    finish(ctx, cmd, outcome).await
}

async fn run(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<Reply, LibraryError> {
    let (name, args) = Args::new(&cmd.data.options)
        .subcommand()
        .ok_or_else(|| LibraryError::invalid("Pick a playlist subcommand."))?;
    let me = cmd.user.id.get();
    let owner = args.user("member").map_or(me, |u| u.get());
    let library = &state.library;

    match name {
        "list" => {
            let lists = library.list(owner, me).await?;
            Ok(Reply::embed(render_list(owner, me, &lists, args.integer("page"))))
        }
        "create" => {
            let playlist = library
                .create(
                    me,
                    args.required_str("name")?,
                    args.str("description").map(str::to_string),
                    args.boolean("public").unwrap_or(true),
                )
                .await?;
            Ok(Reply::embed(success(
                "📁 Playlist Created",
                format!("Created **{}**.", playlist.name),
            )))
        }
        "rename" => {
            let playlist = library
                .rename(me, args.required_str("playlist_name")?, args.required_str("new_name")?)
                .await?;
            Ok(Reply::embed(success(
                "✏️ Playlist Renamed",
                format!("Renamed to **{}**.", playlist.name),
            )))
        }
        "edit" => {
            let description = if args.boolean("clear_description").unwrap_or(false) {
                Some(None)
            } else {
                args.str("description").map(|d| Some(d.to_string()))
            };
            let playlist = library
                .update_details(
                    me,
                    args.required_str("playlist_name")?,
                    description,
                    args.boolean("public"),
                )
                .await?;
            let visibility = if playlist.public { "public" } else { "private" };
            Ok(Reply::embed(success(
                "✏️ Playlist Updated",
                format!("**{}** is now {visibility}.", playlist.name),
            )))
        }
        "delete" => {
            let playlist = library.delete(me, args.required_str("playlist_name")?).await?;
            Ok(Reply::embed(success(
                "🗑️ Playlist Deleted",
                format!("Deleted **{}**.", playlist.name),
            )))
        }
        "view" => {
            let view = library.view(owner, me, args.required_str("playlist_name")?).await?;
            Ok(Reply::embed(render_view(&view, args.integer("page"))))
        }
        "export" => match library.export(me, args.required_str("playlist_name")?).await? {
            Delivery::Inline(message) => Ok(Reply::text(message)),
            Delivery::Attachment { filename, bytes } => Ok(Reply::text(
                "This playlist is too long for one message, so here is a file. Use it with `/playlist import file:`.",
            )
            .with_attachment(CreateAttachment::bytes(bytes, filename))),
        },
        "import" => {
            let data = import_data(cmd, args).await?;
            let view = library.import(me, &data, args.str("name")).await?;
            Ok(Reply::embed(success(
                "📥 Playlist Imported",
                format!(
                    "Created **{}** with {} song(s).",
                    view.playlist.name,
                    view.tracks.len()
                ),
            )))
        }
        "play" => {
            let guild_id = guild_of(cmd)?;
            state
                .settings
                .check_music_channel(guild_id.get(), cmd.channel_id.get())
                .await?;
            let report = state
                .bridge
                .hydrate(
                    owner,
                    me,
                    args.required_str("playlist_name")?,
                    guild_id,
                    user_channel(ctx, guild_id, cmd.user.id),
                    args.boolean("shuffled").unwrap_or(false),
                )
                .await?;
            let mut text = format!("Queued {} song(s).", report.queued);
            if report.failed > 0 {
                text.push_str(&format!(" {} could not be found and were skipped.", report.failed));
            }
            Ok(Reply::embed(success("▶️ Playing Playlist", text)))
        }
        "save" => save_queue(cmd, args, state).await,
        other => Err(LibraryError::invalid(format!("Unknown subcommand `{other}`."))),
    }
}

/// Overwrites a playlist with the live queue, current song first.
pub(super) async fn save_queue(
    cmd: &CommandInteraction,
    args: Args<'_>,
    state: &AppState,
) -> Result<Reply, LibraryError> {
    let guild_id = guild_of(cmd)?;
    let name = args.required_str("playlist_name")?;
    let rows = state.bridge.snapshot(cmd.user.id.get(), name, guild_id).await?;
    Ok(Reply::embed(success(
        "💾 Queue Saved",
        format!("Saved {} song(s) into **{}**, replacing its songs.", rows.len(), name.trim()),
    )))
}

/// The code to import, from the `data` option or an uploaded file.
async fn import_data(cmd: &CommandInteraction, args: Args<'_>) -> Result<String, LibraryError> {
    if let Some(data) = args.str("data") {
        return Ok(data.to_string());
    }
    let id = args
        .attachment("file")
        .ok_or_else(|| LibraryError::invalid("Give either `data` or `file` to import."))?;
    let file = cmd
        .data
        .resolved
        .attachments
        .get(&id)
        .ok_or_else(|| LibraryError::invalid("The uploaded file is missing."))?;
    if file.size > IMPORT_FILE_LIMIT {
        return Err(LibraryError::invalid("That file is too large to be a playlist."));
    }
    audio::fetch_text(&file.url, IMPORT_FILE_LIMIT as usize)
        .await
        .map_err(|e| {
            tracing::warn!("import download failed: {e:#}");
            LibraryError::DecodeFailure("Could not read the uploaded file.".to_string())
        })
}

fn render_list(owner: u64, viewer: u64, lists: &[PlaylistSummary], page: Option<i64>) -> CreateEmbed {
    let whose = if owner == viewer {
        "Your playlists".to_string()
    } else {
        format!("Playlists of <@{owner}>")
    };
    if lists.is_empty() {
        return info(format!("📁 {whose}"), "No playlists yet.");
    }
    let page = Page::of(lists.len(), LIST_PAGE, page);
    let body = lists[page.start..page.end]
        .iter()
        .map(|s| {
            let lock = if s.playlist.public { "" } else { " 🔒" };
            format!("**{}**{lock} · {} song(s)", s.playlist.name, s.track_count)
        })
        .collect::<Vec<_>>()
        .join("\n");
    info(format!("📁 {whose}"), body).footer(page.footer())
}

fn render_view(view: &PlaylistView, page: Option<i64>) -> CreateEmbed {
    let total_ms: i64 = view.tracks.iter().map(|t| t.duration).sum();
    let mut body = view
        .playlist
        .description
        .as_ref()
        .map(|d| format!("*{d}*\n\n"))
        .unwrap_or_default();
    let page = Page::of(view.tracks.len(), VIEW_PAGE, page);
    if view.tracks.is_empty() {
        body.push_str("This playlist is empty.");
    }
    for t in &view.tracks[page.start..page.end] {
        body.push_str(&format!(
            "`{}.` [{}]({}) `{}`\n",
            t.position + 1,
            t.title,
            t.url,
            format_duration(t.duration)
        ));
    }
    info(format!("📁 {}", view.playlist.name), body)
        .field("Songs", view.tracks.len().to_string(), true)
        .field("Length", format_duration(total_ms), true)
        .field("Visibility", if view.playlist.public { "Public" } else { "Private" }, true)
        .footer(page.footer())
}
