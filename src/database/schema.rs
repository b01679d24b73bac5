// Kept in sync by hand with `database::SCHEMA_SQL`.

diesel::table! {
    guild (guild_id) {
        guild_id -> BigInt,
        twenty_four_online -> Bool,
        music_channel_id -> Nullable<BigInt>,
    }
}

diesel::table! {
    member (user_id) {
        user_id -> BigInt,
        volume -> Integer,
        filters -> Text,
        autoplay -> Text,
        loop_mode -> Text,
    }
}

diesel::table! {
    playlist (playlist_id) {
        playlist_id -> Text,
        owner_id -> BigInt,
        name -> Text,
        description -> Nullable<Text>,
        public -> Bool,
        locked -> Bool,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    track (track_id) {
        track_id -> Text,
        playlist_id -> Text,
        title -> Text,
        url -> Text,
        artist -> Nullable<Text>,
        duration -> BigInt,
        position -> Integer,
        added_at -> Timestamp,
    }
}

diesel::joinable!(track -> playlist (playlist_id));

diesel::allow_tables_to_appear_in_same_query!(guild, member, playlist, track);
