use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use serenity::all::GuildId;

use crate::audio;

const TOKEN_CANDIDATES: &[&str] = &[
    "DISCORD_TOKEN",
    "DISCORD_BOT_TOKEN",
    "BOT_TOKEN",
    "DOCKER_TOKEN",
];

const DEFAULT_DATABASE_URL: &str = "melodeck.db";
const DEFAULT_BITRATE: u32 = 96_000;

pub fn read_discord_token() -> Result<String> {
    token_from(|key| std::env::var(key).ok())
}

fn token_from(lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    for key in TOKEN_CANDIDATES {
        if let Some(val) = lookup(key)
            && !val.is_empty()
        {
            return Ok(val);
        }
    }
    Err(anyhow!(
        "Set one of DISCORD_TOKEN, DISCORD_BOT_TOKEN, BOT_TOKEN, or DOCKER_TOKEN in environment"
    ))
}

/// Voice encoder and download settings, fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    pub bitrate: u32,
    pub mono: bool,
    pub download_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub database_url: String,
    /// Register commands to this guild only (instant) instead of globally.
    pub dev_guild: Option<GuildId>,
    pub http_bind: Option<String>,
    pub audio: AudioConfig,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let dev_guild = match non_empty("DEV_GUILD_ID") {
            Some(raw) => Some(GuildId::new(
                raw.trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|id| *id != 0)
                    .with_context(|| format!("DEV_GUILD_ID is not a guild id: {raw}"))?,
            )),
            None => None,
        };

        // Lower, fixed bitrate can reduce CPU usage and packet size on busy hosts.
        let bitrate = non_empty("MELODECK_BITRATE")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|v| (16_000..=192_000).contains(v))
            .unwrap_or(DEFAULT_BITRATE);

        let mono = non_empty("MELODECK_MIX_MODE").is_some_and(|m| m.trim().eq_ignore_ascii_case("mono"));

        let download_dir = audio::resolve_download_dir(non_empty("DOWNLOAD_FOLDER").as_deref())?;

        Ok(Self {
            token: token_from(&lookup)?,
            database_url: non_empty("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            dev_guild,
            http_bind: non_empty("HTTP_BIND"),
            audio: AudioConfig {
                bitrate,
                mono,
                download_dir,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<BotConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BotConfig::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_apply_with_only_a_token() {
        let cfg = config(&[("BOT_TOKEN", "abc"), ("DOWNLOAD_FOLDER", "/tmp/md")]).unwrap();
        assert_eq!(cfg.token, "abc");
        assert_eq!(cfg.database_url, "melodeck.db");
        assert_eq!(cfg.dev_guild, None);
        assert_eq!(cfg.http_bind, None);
        assert_eq!(
            cfg.audio,
            AudioConfig {
                bitrate: 96_000,
                mono: false,
                download_dir: PathBuf::from("/tmp/md"),
            }
        );
    }

    #[test]
    fn token_candidates_are_tried_in_order() {
        let cfg = config(&[("DISCORD_TOKEN", ""), ("DISCORD_BOT_TOKEN", "second"), ("BOT_TOKEN", "third")]).unwrap();
        assert_eq!(cfg.token, "second");
        assert!(config(&[]).is_err());
    }

    #[test]
    fn tunables_are_validated() {
        let cfg = config(&[
            ("DISCORD_TOKEN", "t"),
            ("MELODECK_BITRATE", "500"),
            ("MELODECK_MIX_MODE", "Mono"),
            ("DEV_GUILD_ID", "1234"),
            ("DATABASE_URL", "/data/bot.db"),
            ("DOWNLOAD_FOLDER", "/tmp/md"),
        ])
        .unwrap();
        assert_eq!(cfg.audio.bitrate, 96_000);
        assert!(cfg.audio.mono);
        assert_eq!(cfg.dev_guild, Some(GuildId::new(1234)));
        assert_eq!(cfg.database_url, "/data/bot.db");

        assert!(config(&[("DISCORD_TOKEN", "t"), ("DEV_GUILD_ID", "guild")]).is_err());
    }
}
