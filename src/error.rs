use thiserror::Error;
use tracing::error;

use crate::database::DbError;

/// Failures from the voice and search side.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("not connected to a voice channel")]
    NotConnected,
    #[error("user is not in a voice channel")]
    NoVoiceChannel,
    #[error("failed to join voice channel: {0}")]
    Join(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error("nothing is playing")]
    NothingPlaying,
    #[error("player control failed: {0}")]
    Control(String),
}

impl From<songbird::tracks::ControlError> for AudioError {
    fn from(value: songbird::tracks::ControlError) -> Self {
        Self::Control(value.to_string())
    }
}

/// Error kinds surfaced by playlist and playback operations.
///
/// The string payloads are already safe to show to users; [`Backend`] and
/// [`Audio`] detail is only logged.
///
/// [`Backend`]: LibraryError::Backend
/// [`Audio`]: LibraryError::Audio
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    OwnershipViolation(String),
    #[error("{0}")]
    UniquenessViolation(String),
    #[error("{0}")]
    DecodeFailure(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    Backend(#[from] DbError),
    #[error(transparent)]
    Audio(#[from] AudioError),
}

impl From<diesel::result::Error> for LibraryError {
    fn from(value: diesel::result::Error) -> Self {
        Self::Backend(DbError::Query(value))
    }
}

impl LibraryError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid(why: impl Into<String>) -> Self {
        Self::InvalidInput(why.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::OwnershipViolation(_) => "ownership",
            Self::UniquenessViolation(_) => "uniqueness",
            Self::DecodeFailure(_) => "decode",
            Self::InvalidInput(_) => "invalid_input",
            Self::Backend(_) => "backend",
            Self::Audio(_) => "audio",
        }
    }

    /// Text safe to put in a chat reply. Backend detail goes to the log.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::OwnershipViolation(msg)
            | Self::UniquenessViolation(msg)
            | Self::DecodeFailure(msg)
            | Self::InvalidInput(msg) => msg.clone(),
            Self::Backend(e) => {
                error!("database error: {e}");
                "Something went wrong while talking to the database. Please try again later."
                    .to_string()
            }
            Self::Audio(e) => match e {
                AudioError::NotConnected => "I'm not connected to a voice channel.".to_string(),
                AudioError::NoVoiceChannel => {
                    "You need to be in a voice channel to use this command.".to_string()
                }
                AudioError::NothingPlaying => "Nothing is playing right now.".to_string(),
                AudioError::Join(_) => {
                    error!("voice error: {e}");
                    "Failed to connect to the voice channel.".to_string()
                }
                AudioError::Search(_) | AudioError::Download(_) | AudioError::Control(_) => {
                    error!("audio error: {e}");
                    "The audio backend could not handle that request.".to_string()
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_detail_never_reaches_users() {
        let err = LibraryError::Backend(DbError::Statement("SELECT secret FROM x".into()));
        assert!(!err.user_message().contains("secret"));
        assert_eq!(err.kind(), "backend");
    }

    #[test]
    fn domain_messages_pass_through() {
        let err = LibraryError::UniquenessViolation("Playlist 'a' already exists".into());
        assert_eq!(err.user_message(), "Playlist 'a' already exists");
    }

    #[test]
    fn diesel_errors_become_backend() {
        let err: LibraryError = diesel::result::Error::NotFound.into();
        assert!(matches!(err, LibraryError::Backend(DbError::Query(_))));
    }
}
