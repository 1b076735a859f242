use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use crate::models::format_timestamp;

/// Opaque pagination position: the timestamp of the last item of a page,
/// plus that item's id to break ties between equal timestamps.
///
/// Wire form is `<rfc3339>` or `<rfc3339>~<uuid>`. A cursor without an id
/// selects everything strictly older than the timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub at: DateTime<Utc>,
    pub id: Option<Uuid>,
}

impl Cursor {
    pub fn new(at: DateTime<Utc>, id: Uuid) -> Self {
        Self { at, id: Some(id) }
    }

    pub fn before(at: DateTime<Utc>) -> Self {
        Self { at, id: None }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{}~{}", format_timestamp(&self.at), id),
            None => f.write_str(&format_timestamp(&self.at)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid cursor: {0}")]
pub struct InvalidCursor(pub String);

impl FromStr for Cursor {
    type Err = InvalidCursor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidCursor(s.to_string());
        let (ts, id) = match s.split_once('~') {
            Some((ts, id)) => (ts, Some(id.parse::<Uuid>().map_err(|_| invalid())?)),
            None => (s, None),
        };
        let at = DateTime::parse_from_rfc3339(ts)
            .map_err(|_| invalid())?
            .with_timezone(&Utc);
        Ok(Self { at, id })
    }
}

impl Serialize for Cursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_id() {
        let at = DateTime::from_timestamp(1_700_000_000, 42_000).unwrap();
        let id = Uuid::new_v4();

        let full: Cursor = Cursor::new(at, id).to_string().parse().unwrap();
        assert_eq!(full, Cursor::new(at, id));

        let bare: Cursor = "2023-11-14T22:13:20.000042Z".parse().unwrap();
        assert_eq!(bare, Cursor::before(at));
    }

    #[test]
    fn rejects_garbage() {
        assert!("yesterday".parse::<Cursor>().is_err());
        assert!("2023-11-14T22:13:20Z~not-a-uuid".parse::<Cursor>().is_err());

        let err = "yesterday".parse::<Cursor>().unwrap_err();
        assert_eq!(err, InvalidCursor("yesterday".into()));
        assert_eq!(err.to_string(), "invalid cursor: yesterday");
    }
}
