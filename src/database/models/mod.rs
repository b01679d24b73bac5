pub mod guild;
pub mod member;
pub mod playlist;
pub mod track;

// Re-export all models for convenience
pub use guild::{Guild, GuildUpdate};
pub use member::{Member, MemberUpdate};
pub use playlist::{NewPlaylist, Playlist, PlaylistUpdate};
pub use track::{NewTrack, Track};
