use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{Context as AnyhowContext, Result, anyhow};
use once_cell::sync::Lazy;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use tokio::{fs, process::Command as TokioCommand, sync::OnceCell};
use tracing::{debug, info};
use url::Url;

use crate::player::{Playable, SearchResult};

static HTTP: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent("melodeck/0.1 (+https://github.com/)")
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

static YT_DLP: OnceCell<PathBuf> = OnceCell::const_new();

const GITHUB_RELEASES_API: &str = "https://api.github.com/repos/yt-dlp/yt-dlp/releases/latest";

/// Longest playlist a single probe will expand.
const MAX_PLAYLIST_ENTRIES: usize = 200;

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct ReleaseInfo {
    assets: Vec<ReleaseAsset>,
}

fn cache_dir() -> Result<PathBuf> {
    let base = dirs::cache_dir().ok_or_else(|| anyhow!("no cache dir available on this system"))?;
    Ok(base.join("melodeck").join("yt-dlp"))
}

fn platform_asset_name() -> &'static str {
    if cfg!(target_os = "windows") {
        if cfg!(target_arch = "x86_64") {
            "yt-dlp.exe"
        } else {
            "yt-dlp_x86.exe"
        }
    } else if cfg!(target_os = "linux") {
        "yt-dlp_linux"
    } else if cfg!(target_os = "macos") {
        "yt-dlp_macos"
    } else {
        "yt-dlp"
    }
}

/// Locates yt-dlp on PATH, or installs the latest release into the cache dir.
async fn ensure_yt_dlp() -> Result<PathBuf> {
    YT_DLP.get_or_try_init(install_yt_dlp).await.cloned()
}

async fn install_yt_dlp() -> Result<PathBuf> {
    if let Ok(p) = which::which("yt-dlp") {
        return Ok(p);
    }

    let dir = cache_dir()?;
    fs::create_dir_all(&dir).await.ok();

    let local = dir.join(if cfg!(target_os = "windows") {
        "yt-dlp.exe"
    } else {
        "yt-dlp"
    });
    if fs::try_exists(&local).await.unwrap_or(false) {
        return Ok(local);
    }

    info!("yt-dlp not found, downloading latest release");
    let resp = HTTP
        .get(GITHUB_RELEASES_API)
        .header(ACCEPT, "application/vnd.github+json")
        .send()
        .await?
        .error_for_status()?;
    let rel: ReleaseInfo = resp.json().await?;

    let wanted = platform_asset_name();
    let asset = rel
        .assets
        .into_iter()
        .find(|a| a.name == wanted)
        .ok_or_else(|| anyhow!("no suitable yt-dlp asset for this platform: {}", wanted))?;

    let bytes = HTTP
        .get(asset.browser_download_url)
        .header(USER_AGENT, "melodeck/0.1")
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;

    fs::write(&local, &bytes).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&local).await?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&local, perms).await?;
    }
    Ok(local)
}

/// Fetches a small text body such as an uploaded playlist file.
///
/// The body is read chunk by chunk and dropped as soon as it passes `limit`.
pub async fn fetch_text(url: &str, limit: usize) -> Result<String> {
    let mut resp = HTTP.get(url).send().await?.error_for_status()?;
    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        append_capped(&mut body, &chunk, limit)?;
    }
    String::from_utf8(body).context("file is not valid UTF-8")
}

fn append_capped(body: &mut Vec<u8>, chunk: &[u8], limit: usize) -> Result<()> {
    if body.len() + chunk.len() > limit {
        return Err(anyhow!("file is larger than {limit} bytes"));
    }
    body.extend_from_slice(chunk);
    Ok(())
}

pub fn is_url(query: &str) -> bool {
    Url::parse(query.trim())
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// What yt-dlp is asked to look up: URLs go straight through, anything else
/// becomes a single-result YouTube search.
pub fn probe_target(query: &str) -> String {
    let query = query.trim();
    if is_url(query) {
        query.to_string()
    } else {
        format!("ytsearch1:{query}")
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProbeEntry {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    webpage_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    original_url: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

impl ProbeEntry {
    fn into_playable(self) -> Option<Playable> {
        let url = self.webpage_url.or(self.url).or(self.original_url)?;
        Some(Playable {
            title: self.title.unwrap_or_else(|| url.clone()),
            url,
            artist: self.artist.or(self.uploader).or(self.channel),
            duration_ms: self
                .duration
                .filter(|d| d.is_finite() && *d > 0.0)
                .map_or(0, |d| (d * 1000.0).round() as i64),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(rename = "_type", default)]
    kind: Option<String>,
    #[serde(default)]
    entries: Option<Vec<Option<ProbeEntry>>>,
    #[serde(flatten)]
    item: ProbeEntry,
}

/// Turns `yt-dlp -J --flat-playlist` output into a search result.
///
/// Search queries come back as a one-entry playlist; `from_search` unwraps it.
pub fn parse_probe(json: &str, from_search: bool) -> Result<SearchResult> {
    let out: ProbeOutput = serde_json::from_str(json).context("parsing yt-dlp json")?;
    let is_playlist = out.kind.as_deref() == Some("playlist") || out.entries.is_some();
    if !is_playlist {
        return Ok(out
            .item
            .into_playable()
            .map_or(SearchResult::Empty, SearchResult::Track));
    }

    let tracks: Vec<Playable> = out
        .entries
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .filter_map(ProbeEntry::into_playable)
        .take(MAX_PLAYLIST_ENTRIES)
        .collect();

    if from_search {
        return Ok(tracks
            .into_iter()
            .next()
            .map_or(SearchResult::Empty, SearchResult::Track));
    }
    if tracks.is_empty() {
        return Ok(SearchResult::Empty);
    }
    Ok(SearchResult::Playlist {
        name: out.item.title.unwrap_or_else(|| "Playlist".to_string()),
        tracks,
    })
}

/// Resolves a URL or free-text query through yt-dlp without downloading.
pub async fn probe(query: &str) -> Result<SearchResult> {
    let ytdlp = ensure_yt_dlp().await?;
    let target = probe_target(query);
    let from_search = !is_url(query);
    debug!(%target, "probing with yt-dlp");
    let out = TokioCommand::new(&ytdlp)
        .arg("-J")
        .arg("--flat-playlist")
        .arg("--no-warnings")
        .arg("--playlist-end")
        .arg(MAX_PLAYLIST_ENTRIES.to_string())
        .arg(&target)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .context("running yt-dlp to probe")?;
    if !out.status.success() {
        // yt-dlp exits non-zero for unknown videos; that is an empty result, not a failure.
        debug!(%target, status = %out.status, "yt-dlp probe found nothing");
        return Ok(SearchResult::Empty);
    }
    parse_probe(&String::from_utf8_lossy(&out.stdout), from_search)
}

async fn ytdlp_extract_id(ytdlp: &Path, url: &str) -> Result<String> {
    let out = TokioCommand::new(ytdlp)
        .arg("--print")
        .arg("id")
        .arg("--skip-download")
        .arg("--no-playlist")
        .arg("-q")
        .arg(url)
        .stdin(Stdio::null())
        .output()
        .await
        .context("running yt-dlp to extract id")?;
    if !out.status.success() {
        return Err(anyhow!(
            "yt-dlp --print id failed with status: {}",
            out.status
        ));
    }
    let id = String::from_utf8_lossy(&out.stdout).trim().to_string();
    if id.is_empty() {
        return Err(anyhow!("empty id from yt-dlp"));
    }
    Ok(id)
}

/// Resolves the download folder; relative paths are anchored at the working dir.
pub fn resolve_download_dir(configured: Option<&str>) -> Result<PathBuf> {
    match configured {
        Some(dir) => {
            let p = PathBuf::from(dir);
            if p.is_absolute() {
                Ok(p)
            } else {
                Ok(std::env::current_dir()?.join(p))
            }
        }
        None => Ok(cache_dir()?.join("downloads")),
    }
}

fn job_suffix() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

/// Downloads `url` as 48 kHz stereo mp3 into `base`, reusing a cached copy
/// keyed by the video id.
pub async fn download_mp3(base: &Path, url: &str) -> Result<PathBuf> {
    let ytdlp = ensure_yt_dlp().await?;
    fs::create_dir_all(base).await?;
    let vid = match ytdlp_extract_id(&ytdlp, url).await {
        Ok(v) => v,
        Err(_) => format!("ts-{}", job_suffix()),
    };
    let cached = base.join(format!("{}.mp3", vid));
    if fs::try_exists(&cached).await.unwrap_or(false) {
        debug!(path = %cached.display(), "download cache hit");
        return Ok(cached);
    }
    // A private job dir keeps concurrent downloads from seeing each other's files.
    let dir = base.join(format!("job-{}", job_suffix()));
    fs::create_dir_all(&dir).await?;

    let status = TokioCommand::new(&ytdlp)
        .arg("-f")
        .arg("bestaudio/best")
        .arg("-x")
        .arg("--audio-format")
        .arg("mp3")
        .arg("--audio-quality")
        .arg("0")
        .arg("--postprocessor-args")
        .arg("ffmpeg:-ar 48000 -ac 2")
        .arg("--no-playlist")
        .arg("-q")
        .arg("-o")
        .arg(dir.join("%(id)s.%(ext)s").to_string_lossy().to_string())
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .context("running yt-dlp download")?;
    if !status.success() {
        let _ = fs::remove_dir_all(&dir).await;
        return Err(anyhow!("yt-dlp failed with status: {status}"));
    }

    let mut entries = fs::read_dir(&dir).await?;
    let mut produced: Option<PathBuf> = None;
    while let Some(e) = entries.next_entry().await? {
        let p = e.path();
        if p.extension().and_then(|s| s.to_str()) == Some("mp3") {
            produced = Some(p);
            break;
        }
    }
    let p = produced.ok_or_else(|| anyhow!("no mp3 produced"))?;
    // Another job may have won the race, or the cache may sit on another device.
    let final_path = if fs::try_exists(&cached).await.unwrap_or(false)
        || fs::rename(&p, &cached).await.is_ok()
    {
        cached.clone()
    } else if fs::copy(&p, &cached).await.is_ok() {
        cached.clone()
    } else {
        return Err(anyhow!("could not move {} into the cache", p.display()));
    };
    let _ = fs::remove_dir_all(&dir).await;
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downloads_stop_once_past_the_limit() {
        let mut body = Vec::new();
        append_capped(&mut body, b"abcd", 6).unwrap();
        append_capped(&mut body, b"ef", 6).unwrap();
        assert!(append_capped(&mut body, b"g", 6).is_err());
        assert_eq!(body, b"abcdef");
    }

    #[test]
    fn titles_become_single_result_searches() {
        assert_eq!(probe_target("  never gonna "), "ytsearch1:never gonna");
        assert_eq!(
            probe_target("https://youtu.be/dQw4w9WgXcQ"),
            "https://youtu.be/dQw4w9WgXcQ"
        );
        assert!(!is_url("ftp://example.com/song.mp3"));
        assert!(!is_url("Song A"));
    }

    #[test]
    fn single_video_probe_maps_metadata() {
        let json = r#"{
            "_type": "video",
            "title": "Song A",
            "webpage_url": "https://www.youtube.com/watch?v=u1",
            "uploader": "Band",
            "duration": 215.4
        }"#;
        let SearchResult::Track(t) = parse_probe(json, false).unwrap() else {
            panic!("expected a track");
        };
        assert_eq!(t.title, "Song A");
        assert_eq!(t.url, "https://www.youtube.com/watch?v=u1");
        assert_eq!(t.artist.as_deref(), Some("Band"));
        assert_eq!(t.duration_ms, 215_400);
    }

    #[test]
    fn search_probe_unwraps_first_entry() {
        let json = r#"{
            "_type": "playlist",
            "title": "song b",
            "entries": [
                {"_type": "url", "title": "Song B", "url": "https://www.youtube.com/watch?v=u2", "channel": "C", "duration": null}
            ]
        }"#;
        let SearchResult::Track(t) = parse_probe(json, true).unwrap() else {
            panic!("expected a track");
        };
        assert_eq!(t.url, "https://www.youtube.com/watch?v=u2");
        assert_eq!(t.artist.as_deref(), Some("C"));
        assert_eq!(t.duration_ms, 0);
    }

    #[test]
    fn playlist_probe_keeps_order_and_skips_broken_entries() {
        let json = r#"{
            "_type": "playlist",
            "title": "Mix",
            "entries": [
                {"title": "one", "url": "https://x/1"},
                null,
                {"title": "no url"},
                {"title": "two", "url": "https://x/2"}
            ]
        }"#;
        let SearchResult::Playlist { name, tracks } = parse_probe(json, false).unwrap() else {
            panic!("expected a playlist");
        };
        assert_eq!(name, "Mix");
        let titles: Vec<&str> = tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["one", "two"]);
    }

    #[test]
    fn empty_search_is_empty() {
        let json = r#"{"_type": "playlist", "title": "x", "entries": []}"#;
        assert!(matches!(parse_probe(json, true).unwrap(), SearchResult::Empty));
        assert!(parse_probe("not json", false).is_err());
    }

    #[test]
    fn relative_download_dirs_are_anchored() {
        let dir = resolve_download_dir(Some("cache/mp3")).unwrap();
        assert!(dir.is_absolute());
        assert!(dir.ends_with("cache/mp3"));
    }
}
