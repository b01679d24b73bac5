use tracing::{instrument, warn};

use crate::{
    database::{
        Database,
        models::{Guild, GuildUpdate, Member, MemberUpdate, member::MAX_VOLUME},
        types::{AutoplayMode, LoopMode},
    },
    error::LibraryError,
};

/// Discord snowflakes fit in 63 bits; the store keeps them as signed integers.
pub fn sql_id(id: u64) -> i64 {
    id as i64
}

/// Per-member playback preferences and per-guild options.
#[derive(Debug, Clone)]
pub struct Settings {
    db: Database,
}

impl Settings {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn member(&self, user_id: u64) -> Result<Member, LibraryError> {
        let id = sql_id(user_id);
        self.db
            .run(move |conn| Member::get_or_create(conn, id))
            .await
            .map_err(LibraryError::from)
    }

    /// Like [`Settings::member`] but never fails: a store outage plays with defaults.
    pub async fn member_or_default(&self, user_id: u64) -> Member {
        match self.member(user_id).await {
            Ok(m) => m,
            Err(e) => {
                warn!(user_id, "using default member settings: {e}");
                Member::with_defaults(sql_id(user_id))
            }
        }
    }

    async fn update_member(&self, user_id: u64, changes: MemberUpdate) -> Result<Member, LibraryError> {
        let id = sql_id(user_id);
        self.db
            .transaction(move |conn| {
                Member::get_or_create(conn, id)?;
                Member::update(conn, id, changes)?;
                Member::get_or_create(conn, id).map_err(LibraryError::from)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn set_volume(&self, user_id: u64, volume: i32) -> Result<Member, LibraryError> {
        if !(0..=MAX_VOLUME).contains(&volume) {
            return Err(LibraryError::invalid(format!(
                "Volume must be between 0 and {MAX_VOLUME}."
            )));
        }
        self.update_member(
            user_id,
            MemberUpdate {
                volume: Some(volume),
                ..Default::default()
            },
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn set_autoplay(&self, user_id: u64, mode: AutoplayMode) -> Result<Member, LibraryError> {
        self.update_member(
            user_id,
            MemberUpdate {
                autoplay: Some(mode),
                ..Default::default()
            },
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn set_loop(&self, user_id: u64, mode: LoopMode) -> Result<Member, LibraryError> {
        self.update_member(
            user_id,
            MemberUpdate {
                loop_mode: Some(mode),
                ..Default::default()
            },
        )
        .await
    }

    /// Records a guild the bot has joined. Returns `true` the first time.
    pub async fn register_guild(&self, guild_id: u64) -> Result<bool, LibraryError> {
        let id = sql_id(guild_id);
        self.db
            .run(move |conn| Guild::create_or_ignore(conn, id))
            .await
            .map_err(LibraryError::from)
    }

    pub async fn guild(&self, guild_id: u64) -> Result<Guild, LibraryError> {
        let id = sql_id(guild_id);
        self.db
            .run(move |conn| Guild::ensure(conn, id))
            .await
            .map_err(LibraryError::from)
    }

    async fn update_guild(&self, guild_id: u64, changes: GuildUpdate) -> Result<Guild, LibraryError> {
        let id = sql_id(guild_id);
        self.db
            .transaction(move |conn| {
                Guild::create_or_ignore(conn, id)?;
                Guild::update(conn, id, changes)?;
                Guild::ensure(conn, id).map_err(LibraryError::from)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn set_always_online(&self, guild_id: u64, enabled: bool) -> Result<Guild, LibraryError> {
        self.update_guild(
            guild_id,
            GuildUpdate {
                twenty_four_online: Some(enabled),
                ..Default::default()
            },
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn set_music_channel(
        &self,
        guild_id: u64,
        channel_id: Option<u64>,
    ) -> Result<Guild, LibraryError> {
        self.update_guild(
            guild_id,
            GuildUpdate {
                music_channel_id: Some(channel_id.map(sql_id)),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn always_online_guilds(&self) -> Result<Vec<u64>, LibraryError> {
        let ids = self
            .db
            .run(|conn| Guild::list_always_online(conn).map_err(LibraryError::from))
            .await?;
        Ok(ids.into_iter().map(|id| id as u64).collect())
    }

    /// `Ok(())` when play commands may run in `channel_id`; otherwise names the
    /// configured music channel.
    pub async fn check_music_channel(&self, guild_id: u64, channel_id: u64) -> Result<(), LibraryError> {
        let guild = self.guild(guild_id).await?;
        match guild.music_channel_id {
            Some(allowed) if allowed != sql_id(channel_id) => Err(LibraryError::invalid(format!(
                "Music commands can only be used in <#{}>.",
                allowed as u64
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestDb;

    #[tokio::test]
    async fn new_members_get_defaults_and_updates_stick() {
        let t = TestDb::new().await;
        let settings = Settings::new(t.db.clone());
        let fresh = settings.member(42).await.unwrap();
        assert_eq!(fresh, Member::with_defaults(42));

        settings.set_volume(42, 150).await.unwrap();
        let looped = settings.set_loop(42, LoopMode::All).await.unwrap();
        assert_eq!(looped.volume, 150);
        assert_eq!(looped.loop_mode, LoopMode::All);

        let auto = settings.set_autoplay(42, AutoplayMode::Enabled).await.unwrap();
        assert_eq!(auto.autoplay, AutoplayMode::Enabled);
        assert_eq!(auto.loop_mode, LoopMode::All);
    }

    #[tokio::test]
    async fn volume_is_range_checked_before_the_store() {
        let t = TestDb::new().await;
        let settings = Settings::new(t.db.clone());
        let err = settings.set_volume(1, 1001).await.unwrap_err();
        assert!(matches!(err, LibraryError::InvalidInput(_)));
        assert!(settings.set_volume(1, 1000).await.is_ok());
        assert!(settings.set_volume(1, -1).await.is_err());
    }

    #[tokio::test]
    async fn unreachable_store_falls_back_to_defaults() {
        let settings = Settings::new(Database::new("/nonexistent/dir/melodeck.db"));
        let m = settings.member_or_default(7).await;
        assert_eq!(m, Member::with_defaults(7));
    }

    #[tokio::test]
    async fn guild_options_and_music_channel_gate() {
        let t = TestDb::new().await;
        let settings = Settings::new(t.db.clone());
        assert!(settings.register_guild(5).await.unwrap());
        assert!(!settings.register_guild(5).await.unwrap());

        assert!(settings.check_music_channel(5, 100).await.is_ok());
        settings.set_music_channel(5, Some(200)).await.unwrap();
        assert!(settings.check_music_channel(5, 100).await.is_err());
        assert!(settings.check_music_channel(5, 200).await.is_ok());
        settings.set_music_channel(5, None).await.unwrap();
        assert!(settings.check_music_channel(5, 100).await.is_ok());

        settings.set_always_online(5, true).await.unwrap();
        settings.set_always_online(6, false).await.unwrap();
        assert_eq!(settings.always_online_guilds().await.unwrap(), vec![5]);
    }
}
