//! Portable playlist codes: JSON, zlib, then URL-safe base64.

use std::io::{Read, Write};

use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use flate2::{Compression, read::ZlibDecoder, write::ZlibEncoder};
use serde::{Deserialize, Serialize};

use crate::{
    database::models::{Playlist, Track},
    error::LibraryError,
};

/// Discord's per-message character limit.
pub const MESSAGE_LIMIT: usize = 2000;
/// Inflated payloads beyond this are refused.
pub const MAX_DECODED_BYTES: u64 = 1024 * 1024;
pub const ATTACHMENT_NAME: &str = "playlist.txt";

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedSong {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub position: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistExport {
    pub playlist_name: String,
    pub playlist_owner: i64,
    pub songs: Vec<ExportedSong>,
}

impl PlaylistExport {
    pub fn new(playlist: &Playlist, tracks: &[Track]) -> Self {
        Self {
            playlist_name: playlist.name.clone(),
            playlist_owner: playlist.owner_id,
            songs: tracks
                .iter()
                .map(|t| ExportedSong {
                    title: t.title.clone(),
                    url: t.url.clone(),
                    artist: t.artist.clone(),
                    duration: t.duration,
                    position: Some(t.position),
                })
                .collect(),
        }
    }
}

/// How an export reaches the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// A fenced message body.
    Inline(String),
    Attachment { filename: &'static str, bytes: Vec<u8> },
}

impl Delivery {
    pub fn for_code(code: String) -> Self {
        if code.len() + 2 * FENCE.len() <= MESSAGE_LIMIT {
            Self::Inline(format!("{FENCE}{code}{FENCE}"))
        } else {
            Self::Attachment {
                filename: ATTACHMENT_NAME,
                bytes: code.into_bytes(),
            }
        }
    }
}

fn decode_failure(detail: impl std::fmt::Display) -> LibraryError {
    tracing::debug!("playlist code rejected: {detail}");
    LibraryError::DecodeFailure("That playlist code is invalid or corrupted.".to_string())
}

pub fn encode(export: &PlaylistExport) -> Result<String, LibraryError> {
    let json = serde_json::to_vec(export).map_err(|e| LibraryError::invalid(e.to_string()))?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&json)
        .and_then(|_| encoder.finish())
        .map(|compressed| URL_SAFE.encode(compressed))
        .map_err(|e| LibraryError::invalid(format!("compressing playlist: {e}")))
}

/// Parses a code as pasted by a user: surrounding whitespace and a code fence
/// are tolerated.
pub fn decode(data: &str) -> Result<PlaylistExport, LibraryError> {
    let trimmed = data.trim();
    let code = trimmed
        .strip_prefix(FENCE)
        .and_then(|s| s.strip_suffix(FENCE))
        .unwrap_or(trimmed)
        .trim();
    if code.is_empty() {
        return Err(decode_failure("empty code"));
    }

    let compressed = URL_SAFE.decode(code).map_err(decode_failure)?;
    let mut json = Vec::new();
    ZlibDecoder::new(compressed.as_slice())
        .take(MAX_DECODED_BYTES + 1)
        .read_to_end(&mut json)
        .map_err(decode_failure)?;
    if json.len() as u64 > MAX_DECODED_BYTES {
        return Err(decode_failure("payload too large"));
    }

    let export: PlaylistExport = serde_json::from_slice(&json).map_err(decode_failure)?;
    if export
        .songs
        .iter()
        .any(|s| s.url.trim().is_empty() || s.title.trim().is_empty())
    {
        return Err(decode_failure("song without url or title"));
    }
    Ok(export)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(n: usize) -> PlaylistExport {
        PlaylistExport {
            playlist_name: "road-trip".into(),
            playlist_owner: 42,
            songs: (0..n)
                .map(|i| ExportedSong {
                    title: format!("Song {i}"),
                    url: format!("https://www.youtube.com/watch?v=track{i:04}"),
                    artist: None,
                    duration: 1000 * i as i64,
                    position: Some(i as i32),
                })
                .collect(),
        }
    }

    #[test]
    fn code_survives_a_round_trip() {
        let export = sample(3);
        let code = encode(&export).unwrap();
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric() || "-_=".contains(c)));
        assert_eq!(decode(&code).unwrap(), export);
        assert_eq!(decode(&format!("  ```{code}```\n")).unwrap(), export);
    }

    #[test]
    fn older_codes_without_metadata_still_parse() {
        let json = br#"{"playlist_name":"x","playlist_owner":1,"songs":[{"title":"a","url":"u1"}]}"#;
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(json).unwrap();
        let code = URL_SAFE.encode(enc.finish().unwrap());
        let export = decode(&code).unwrap();
        assert_eq!(export.songs[0].duration, 0);
        assert_eq!(export.songs[0].position, None);
    }

    #[test]
    fn corrupted_codes_fail_to_decode() {
        let code = encode(&sample(3)).unwrap();
        let mut bytes = code.into_bytes();
        let mid = bytes.len() / 2;
        bytes[mid] = if bytes[mid] == b'A' { b'B' } else { b'A' };
        let corrupted = String::from_utf8(bytes).unwrap();
        assert!(matches!(decode(&corrupted), Err(LibraryError::DecodeFailure(_))));
        assert!(matches!(decode("%%%"), Err(LibraryError::DecodeFailure(_))));
        assert!(matches!(decode("   "), Err(LibraryError::DecodeFailure(_))));
    }

    fn code_for(json: &[u8]) -> String {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(json).unwrap();
        URL_SAFE.encode(enc.finish().unwrap())
    }

    #[test]
    fn songs_need_both_title_and_url() {
        let no_title = code_for(br#"{"playlist_name":"x","playlist_owner":1,"songs":[{"title":"a","url":"u1"},{"title":"  ","url":"u2"}]}"#);
        assert!(matches!(decode(&no_title), Err(LibraryError::DecodeFailure(_))));

        let no_url = code_for(br#"{"playlist_name":"x","playlist_owner":1,"songs":[{"title":"a","url":""}]}"#);
        assert!(matches!(decode(&no_url), Err(LibraryError::DecodeFailure(_))));
    }

    #[test]
    fn oversized_payloads_are_refused() {
        let huge = vec![b' '; (MAX_DECODED_BYTES + 10) as usize];
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::best());
        enc.write_all(&huge).unwrap();
        let code = URL_SAFE.encode(enc.finish().unwrap());
        assert!(matches!(decode(&code), Err(LibraryError::DecodeFailure(_))));
    }

    #[test]
    fn short_codes_go_inline_and_long_ones_attach() {
        let inline = Delivery::for_code("abc".into());
        assert_eq!(inline, Delivery::Inline("```abc```".into()));

        let fits = "x".repeat(MESSAGE_LIMIT - 6);
        assert!(matches!(Delivery::for_code(fits), Delivery::Inline(_)));

        let long = "x".repeat(MESSAGE_LIMIT - 5);
        let Delivery::Attachment { filename, bytes } = Delivery::for_code(long.clone()) else {
            panic!("expected attachment");
        };
        assert_eq!(filename, ATTACHMENT_NAME);
        assert_eq!(bytes, long.into_bytes());
    }
}
