use std::{fmt, str::FromStr};

use diesel::{
    AsExpression, FromSqlRow,
    backend::Backend,
    deserialize::{self, FromSql},
    serialize::{self, IsNull, Output, ToSql},
    sql_types::Text,
    sqlite::Sqlite,
};
use thiserror::Error;
use uuid::Uuid;

/// UUID primary key stored as its hyphenated text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for RecordId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl ToSql<Text, Sqlite> for RecordId {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.0.to_string());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for RecordId {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let text = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(Self(Uuid::parse_str(&text)?))
    }
}

#[derive(Debug, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseModeError {
    kind: &'static str,
    value: String,
}

/// How the player behaves once the queue runs dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum AutoplayMode {
    Disabled,
    #[default]
    Partial,
    Enabled,
}

impl AutoplayMode {
    pub const ALL: [AutoplayMode; 3] = [Self::Disabled, Self::Partial, Self::Enabled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Partial => "partial",
            Self::Enabled => "enabled",
        }
    }
}

impl FromStr for AutoplayMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "disabled" => Ok(Self::Disabled),
            "partial" => Ok(Self::Partial),
            "enabled" => Ok(Self::Enabled),
            _ => Err(ParseModeError {
                kind: "autoplay mode",
                value: s.to_string(),
            }),
        }
    }
}

/// Queue repeat behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum LoopMode {
    #[default]
    Normal,
    Single,
    All,
}

impl LoopMode {
    pub const ALL: [LoopMode; 3] = [Self::Normal, Self::Single, Self::All];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Single => "single",
            Self::All => "all",
        }
    }
}

impl FromStr for LoopMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "single" => Ok(Self::Single),
            "all" => Ok(Self::All),
            _ => Err(ParseModeError {
                kind: "loop mode",
                value: s.to_string(),
            }),
        }
    }
}

macro_rules! text_enum_sql {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql<Text, Sqlite> for $ty {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
                out.set_value(self.as_str());
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Sqlite> for $ty {
            fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
                let text = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
                Ok(text.parse()?)
            }
        }
    };
}

text_enum_sql!(AutoplayMode);
text_enum_sql!(LoopMode);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_parse_case_insensitively() {
        assert_eq!("Partial".parse::<AutoplayMode>().unwrap(), AutoplayMode::Partial);
        assert_eq!(" ALL ".parse::<LoopMode>().unwrap(), LoopMode::All);
        assert!("loud".parse::<AutoplayMode>().is_err());
    }

    #[test]
    fn modes_round_trip_through_their_text_form() {
        for mode in AutoplayMode::ALL {
            assert_eq!(mode.as_str().parse::<AutoplayMode>().unwrap(), mode);
        }
        for mode in LoopMode::ALL {
            assert_eq!(mode.to_string().parse::<LoopMode>().unwrap(), mode);
        }
    }

    #[test]
    fn record_id_parses_its_display_form() {
        let id = RecordId::new_v4();
        assert_eq!(id.to_string().parse::<RecordId>().unwrap(), id);
    }
}
