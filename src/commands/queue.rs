use anyhow::Result;
use serenity::all::{
    CommandInteraction, Context as SerenityContext, CreateCommand, CreateEmbed, CreateEmbedFooter,
};

use super::{Args, Page, Reply, defer, finish, format_duration, guild_of, info, page_option};
use crate::{
    error::{AudioError, LibraryError},
    player::{LiveQueue, Playable, SessionSettings},
    state::AppState,
};

const PAGE: usize = 10;

pub fn queue_definition() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Show the current queue")
        .dm_permission(false)
        .add_option(page_option())
}

pub fn np_definition() -> CreateCommand {
    CreateCommand::new("np")
        .description("Show the song that is playing")
        .dm_permission(false)
}

fn line(p: &Playable) -> String {
    if p.duration_ms > 0 {
        format!("[{}]({}) `{}`", p.title, p.url, format_duration(p.duration_ms))
    } else {
        format!("[{}]({})", p.title, p.url)
    }
}

fn settings_text(s: SessionSettings) -> String {
    format!(
        "Volume {}% · Loop {} · Autoplay {}",
        s.volume, s.loop_mode, s.autoplay
    )
}

fn settings_footer(s: SessionSettings, page: Page) -> CreateEmbedFooter {
    CreateEmbedFooter::new(format!(
        "{} · Page {}/{}",
        settings_text(s),
        page.number,
        page.total
    ))
}

fn render_queue(q: &LiveQueue, page: Page) -> String {
    let mut out = String::new();
    if let Some(current) = &q.current {
        out.push_str(&format!("**Now:** {}\n", line(current)));
    }
    for (i, p) in q.upcoming[page.start..page.end].iter().enumerate() {
        out.push_str(&format!("`{}.` {}\n", page.start + i + 1, line(p)));
    }
    out
}

pub async fn handle_queue(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;
    let outcome = async {
        let guild_id = guild_of(cmd)?;
        let q = state.audio.snapshot(guild_id).await?;
        if q.is_empty() {
            return Err(LibraryError::Audio(AudioError::NothingPlaying));
        }
        let settings = state.audio.settings(guild_id).await;
        let total = q.upcoming.len() + usize::from(q.current.is_some());
        let page = Page::of(q.upcoming.len(), PAGE, Args::new(&cmd.data.options).integer("page"));
        let embed: CreateEmbed = info(format!("🎶 Queue ({total} songs)"), render_queue(&q, page))
            .footer(settings_footer(settings, page));
        Ok::<_, LibraryError>(Reply::embed(embed))
    }
    .await;
    finish(ctx, cmd, outcome).await
}

pub async fn handle_np(ctx: &SerenityContext, cmd: &CommandInteraction, state: &AppState) -> Result<()> {
    defer(ctx, cmd).await;
    let outcome = async {
        let guild_id = guild_of(cmd)?;
        let current = state
            .audio
            .snapshot(guild_id)
            .await?
            .current
            .ok_or(AudioError::NothingPlaying)?;
        let mut embed = info("🎵 Now Playing", line(&current));
        if let Some(artist) = &current.artist {
            embed = embed.field("Artist", artist, true);
        }
        let settings = state.audio.settings(guild_id).await;
        Ok::<_, LibraryError>(Reply::embed(
            embed.footer(CreateEmbedFooter::new(settings_text(settings))),
        ))
    }
    .await;
    finish(ctx, cmd, outcome).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(n: usize) -> Playable {
        Playable {
            title: format!("Song {n}"),
            url: format!("https://x/{n}"),
            artist: None,
            duration_ms: 61_000,
        }
    }

    #[test]
    fn long_queues_are_paged() {
        let q = LiveQueue {
            current: Some(song(0)),
            upcoming: (1..=23).map(song).collect(),
        };
        let first = render_queue(&q, Page::of(q.upcoming.len(), PAGE, None));
        assert!(first.starts_with("**Now:** [Song 0](https://x/0) `1:01`"));
        assert!(first.contains("`10.` [Song 10]"));
        assert!(!first.contains("Song 11]"));

        let last = render_queue(&q, Page::of(q.upcoming.len(), PAGE, Some(3)));
        assert!(last.contains("`21.` [Song 21]"));
        assert!(last.trim_end().ends_with("`23.` [Song 23](https://x/23) `1:01`"));
        assert!(!last.contains("Song 20]"));
    }
}
