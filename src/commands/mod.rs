//! Slash-command surface. Every handler defers, runs one core operation and
//! edits the deferred response with the outcome.

use std::time::Duration;

use anyhow::Result;
use serenity::all::{
    AttachmentId, ChannelId, CommandDataOption, CommandDataOptionValue, CommandInteraction,
    CommandOptionType, Context as SerenityContext, CreateAttachment, CreateAutocompleteResponse,
    CreateCommand, CreateCommandOption, CreateEmbed, CreateEmbedFooter, CreateInteractionResponse,
    CreateInteractionResponseMessage,
    EditInteractionResponse, GuildId, UserId,
};
use tracing::{error, warn};

use crate::{error::LibraryError, state::AppState};

pub mod control;
pub mod guild;
pub mod play;
pub mod playlist;
pub mod queue;
pub mod settings;
pub mod skip;
pub mod song;
pub mod stop;

pub const OK_COLOUR: u32 = 0x00FF7F; // Spring green
pub const INFO_COLOUR: u32 = 0x5865F2;
pub const ERROR_COLOUR: u32 = 0xFF6B6B; // Red

const AUTOCOMPLETE_OPTION: &str = "playlist_name";
/// Discord rejects embed descriptions longer than this (in characters).
pub const DESCRIPTION_LIMIT: usize = 4096;

/// Typed access to an interaction's options.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    options: &'a [CommandDataOption],
}

impl<'a> Args<'a> {
    pub fn new(options: &'a [CommandDataOption]) -> Self {
        Self { options }
    }

    /// The invoked subcommand and its own options.
    pub fn subcommand(self) -> Option<(&'a str, Args<'a>)> {
        self.options.iter().find_map(|o| match &o.value {
            CommandDataOptionValue::SubCommand(inner) => Some((o.name.as_str(), Args::new(inner))),
            _ => None,
        })
    }

    fn value(self, name: &str) -> Option<&'a CommandDataOptionValue> {
        self.options.iter().find(|o| o.name == name).map(|o| &o.value)
    }

    pub fn str(self, name: &str) -> Option<&'a str> {
        match self.value(name)? {
            CommandDataOptionValue::String(s) => Some(s.as_str()),
            CommandDataOptionValue::Autocomplete { value, .. } => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn required_str(self, name: &str) -> Result<&'a str, LibraryError> {
        self.str(name)
            .ok_or_else(|| LibraryError::invalid(format!("Missing `{name}`.")))
    }

    pub fn integer(self, name: &str) -> Option<i64> {
        match self.value(name)? {
            CommandDataOptionValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn required_integer(self, name: &str) -> Result<i64, LibraryError> {
        self.integer(name)
            .ok_or_else(|| LibraryError::invalid(format!("Missing `{name}`.")))
    }

    pub fn boolean(self, name: &str) -> Option<bool> {
        match self.value(name)? {
            CommandDataOptionValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn user(self, name: &str) -> Option<UserId> {
        match self.value(name)? {
            CommandDataOptionValue::User(id) => Some(*id),
            _ => None,
        }
    }

    pub fn channel(self, name: &str) -> Option<ChannelId> {
        match self.value(name)? {
            CommandDataOptionValue::Channel(id) => Some(*id),
            _ => None,
        }
    }

    pub fn attachment(self, name: &str) -> Option<AttachmentId> {
        match self.value(name)? {
            CommandDataOptionValue::Attachment(id) => Some(*id),
            _ => None,
        }
    }
}

/// A successful command outcome.
#[derive(Debug, Default)]
pub struct Reply {
    content: Option<String>,
    embed: Option<CreateEmbed>,
    attachment: Option<CreateAttachment>,
}

impl Reply {
    pub fn embed(embed: CreateEmbed) -> Self {
        Self {
            embed: Some(embed),
            ..Default::default()
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_attachment(mut self, attachment: CreateAttachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    fn into_edit(self) -> EditInteractionResponse {
        let mut edit = EditInteractionResponse::new();
        if let Some(content) = self.content {
            edit = edit.content(content);
        }
        if let Some(embed) = self.embed {
            edit = edit.embed(embed);
        }
        if let Some(attachment) = self.attachment {
            edit = edit.new_attachment(attachment);
        }
        edit
    }
}

pub fn success(title: impl Into<String>, description: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new()
        .title(title)
        .description(fit_description(description.into()))
        .colour(OK_COLOUR)
}

pub fn info(title: impl Into<String>, description: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new()
        .title(title)
        .description(fit_description(description.into()))
        .colour(INFO_COLOUR)
}

pub fn failure(err: &LibraryError) -> CreateEmbed {
    CreateEmbed::new()
        .title("Error")
        .description(err.user_message())
        .colour(ERROR_COLOUR)
}

/// One page of a longer listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number, clamped to the pages that exist.
    pub number: usize,
    pub total: usize,
    /// Index of the first item on this page.
    pub start: usize,
    pub end: usize,
}

impl Page {
    pub fn of(len: usize, per_page: usize, requested: Option<i64>) -> Self {
        let total = len.div_ceil(per_page).max(1);
        let number = requested
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(1)
            .clamp(1, total);
        let start = (number - 1) * per_page;
        Self {
            number,
            total,
            start,
            end: (start + per_page).min(len),
        }
    }

    pub fn footer(&self) -> CreateEmbedFooter {
        CreateEmbedFooter::new(format!("Page {}/{}", self.number, self.total))
    }
}

pub fn page_option() -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::Integer, "page", "Page to show").min_int_value(1)
}

/// Cuts `text` so it fits an embed description.
pub fn fit_description(text: String) -> String {
    if text.chars().count() <= DESCRIPTION_LIMIT {
        return text;
    }
    let mut cut: String = text.chars().take(DESCRIPTION_LIMIT - 1).collect();
    cut.push('…');
    cut
}

pub async fn defer(ctx: &SerenityContext, cmd: &CommandInteraction) {
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
    )
    .await
    .ok();
}

/// Edits the deferred response with `outcome`.
pub async fn finish(
    ctx: &SerenityContext,
    cmd: &CommandInteraction,
    outcome: Result<Reply, LibraryError>,
) -> Result<()> {
    let edit = match outcome {
        Ok(reply) => reply.into_edit(),
        Err(e) => {
            warn!(command = %cmd.data.name, kind = e.kind(), "command failed: {e}");
            EditInteractionResponse::new().embed(failure(&e))
        }
    };
    cmd.edit_response(&ctx.http, edit).await?;
    Ok(())
}

pub fn guild_of(cmd: &CommandInteraction) -> Result<GuildId, LibraryError> {
    cmd.guild_id
        .ok_or_else(|| LibraryError::invalid("This command only works in a server."))
}

/// The voice channel `user` is sitting in, according to the gateway cache.
pub fn user_channel(ctx: &SerenityContext, guild_id: GuildId, user: UserId) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild.voice_states.get(&user).and_then(|vs| vs.channel_id)
}

/// Parses `1m30s`, `90s`, `90`, `1:30` or `1:02:03` into a duration.
pub fn parse_timestamp(input: &str) -> Option<Duration> {
    let s = input.trim().to_ascii_lowercase();
    if s.is_empty() {
        return None;
    }
    if s.contains(':') {
        let mut secs: u64 = 0;
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() > 3 {
            return None;
        }
        for part in parts {
            secs = secs.checked_mul(60)?.checked_add(part.parse().ok()?)?;
        }
        return Some(Duration::from_secs(secs));
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        let n: u64 = digits.parse().ok()?;
        total = total.checked_add(n.checked_mul(unit)?)?;
        digits.clear();
    }
    if !digits.is_empty() {
        return None;
    }
    Some(Duration::from_secs(total))
}

/// `m:ss`, or `h:mm:ss` past an hour.
pub fn format_duration(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

pub fn definitions() -> Vec<CreateCommand> {
    let mut defs = vec![
        play::definition("play", "Play a song or playlist from a URL or search"),
        play::definition("playnext", "Queue a song right after the current one"),
        play::definition("playskip", "Play a song now, skipping the current one"),
        skip::definition(),
        stop::definition(),
        queue::queue_definition(),
        queue::np_definition(),
        playlist::definition(),
        song::definition(),
        guild::definition(),
    ];
    defs.extend(control::definitions());
    defs.extend(settings::definitions());
    defs
}

pub async fn dispatch(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) {
    let name = cmd.data.name.as_str();
    let res = match name {
        "play" | "playnext" | "playskip" => play::handle(ctx, cmd, state).await,
        "skip" => skip::handle(ctx, cmd, state).await,
        "stop" => stop::handle(ctx, cmd, state).await,
        "queue" => queue::handle_queue(ctx, cmd, state).await,
        "np" => queue::handle_np(ctx, cmd, state).await,
        "playlist" => playlist::handle(ctx, cmd, state).await,
        "song" => song::handle(ctx, cmd, state).await,
        "guild" => guild::handle(ctx, cmd, state).await,
        "volume" | "autoplay" | "loop" => settings::handle(ctx, cmd, state).await,
        "pause" | "resume" | "seek" | "shuffle" | "clear" | "connect" | "disconnect" => {
            control::handle(ctx, cmd, state).await
        }
        _ => Ok(()),
    };
    if let Err(why) = res {
        error!("/{name} failed: {why:?}");
    }
}

/// Suggests the caller's own playlist names.
pub async fn autocomplete(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) {
    let Some(focused) = cmd.data.autocomplete() else {
        return;
    };
    if focused.name != AUTOCOMPLETE_OPTION {
        return;
    }
    let names = match state.library.names_for(cmd.user.id.get(), focused.value).await {
        Ok(names) => names,
        Err(e) => {
            warn!("autocomplete failed: {e}");
            Vec::new()
        }
    };
    let choices = names
        .into_iter()
        .fold(CreateAutocompleteResponse::new(), |resp, name| {
            resp.add_string_choice(name.clone(), name)
        });
    cmd.create_response(&ctx.http, CreateInteractionResponse::Autocomplete(choices))
        .await
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_in_every_accepted_shape() {
        assert_eq!(parse_timestamp("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_timestamp("90s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_timestamp(" 90 "), Some(Duration::from_secs(90)));
        assert_eq!(parse_timestamp("1:30"), Some(Duration::from_secs(90)));
        assert_eq!(parse_timestamp("1:02:03"), Some(Duration::from_secs(3723)));
        assert_eq!(parse_timestamp("1h"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn malformed_timestamps_are_rejected() {
        for bad in ["", "abc", "1x", "5m3", "1:2:3:4", ":", "m"] {
            assert_eq!(parse_timestamp(bad), None, "{bad}");
        }
    }

    #[test]
    fn durations_format_like_a_player() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(215_000), "3:35");
        assert_eq!(format_duration(3_723_000), "1:02:03");
        assert_eq!(format_duration(-5), "0:00");
    }

    #[test]
    fn pages_clamp_to_what_exists() {
        assert_eq!(
            Page::of(45, 15, Some(3)),
            Page { number: 3, total: 3, start: 30, end: 45 }
        );
        assert_eq!(Page::of(45, 15, Some(9)).number, 3);
        assert_eq!(Page::of(45, 15, Some(-2)).number, 1);
        assert_eq!(Page::of(45, 15, None).end, 15);
        assert_eq!(Page::of(0, 15, None), Page { number: 1, total: 1, start: 0, end: 0 });
    }

    #[test]
    fn long_descriptions_are_cut_to_the_limit() {
        let short = "fine".to_string();
        assert_eq!(fit_description(short.clone()), short);
        let cut = fit_description("é".repeat(DESCRIPTION_LIMIT + 50));
        assert_eq!(cut.chars().count(), DESCRIPTION_LIMIT);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn every_command_is_registered_once() {
        let defs = definitions();
        assert_eq!(defs.len(), 20);
    }
}
