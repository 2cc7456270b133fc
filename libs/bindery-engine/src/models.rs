use std::fmt;
use std::str::FromStr;

use bindery_api::Entity;
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

/// UTC instant with an RFC 3339 text form (microsecond precision).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DateTime::parse_from_rfc3339(s).map(|dt| Self(dt.with_timezone(&Utc)))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

/// Common columns for entities: generated id and timestamps.
///
/// Embed with `#[field(flatten)]`; the attributes appear on the outer entity.
#[derive(Debug, Clone, Default, PartialEq, Entity)]
#[entity(name = "BaseModel")]
pub struct BaseModel {
    #[field(name = "id", text)]
    pub id: Uuid,

    #[field(name = "created_at", text)]
    pub created_at: Timestamp,

    #[field(name = "updated_at", text)]
    pub updated_at: Timestamp,
}

impl BaseModel {
    /// Fresh v4 id, both timestamps set to now.
    pub fn new() -> Self {
        let now = Timestamp::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}
