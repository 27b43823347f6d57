use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod query;

pub use query::{
    BasePropertySet, FolderView, ItemField, ItemView, PropertySet, QueryError, SearchFilter,
    SortDirection,
};

/// Server schema version sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExchangeVersion {
    Exchange2007Sp1,
    Exchange2010,
    Exchange2010Sp1,
    #[default]
    Exchange2010Sp2,
    Exchange2013,
    Exchange2013Sp1,
}

impl ExchangeVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeVersion::Exchange2007Sp1 => "Exchange2007_SP1",
            ExchangeVersion::Exchange2010 => "Exchange2010",
            ExchangeVersion::Exchange2010Sp1 => "Exchange2010_SP1",
            ExchangeVersion::Exchange2010Sp2 => "Exchange2010_SP2",
            ExchangeVersion::Exchange2013 => "Exchange2013",
            ExchangeVersion::Exchange2013Sp1 => "Exchange2013_SP1",
        }
    }
}

impl fmt::Display for ExchangeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown Exchange version: {0}")]
pub struct UnknownVersion(pub String);

impl FromStr for ExchangeVersion {
    type Err = UnknownVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Exchange2007_SP1" => Ok(ExchangeVersion::Exchange2007Sp1),
            "Exchange2010" => Ok(ExchangeVersion::Exchange2010),
            "Exchange2010_SP1" => Ok(ExchangeVersion::Exchange2010Sp1),
            "Exchange2010_SP2" => Ok(ExchangeVersion::Exchange2010Sp2),
            "Exchange2013" => Ok(ExchangeVersion::Exchange2013),
            "Exchange2013_SP1" => Ok(ExchangeVersion::Exchange2013Sp1),
            other => Err(UnknownVersion(other.to_string())),
        }
    }
}

/// Folders addressable by name rather than by id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WellKnownFolder {
    Inbox,
}

impl WellKnownFolder {
    /// Distinguished folder id understood by the server
    pub fn distinguished_id(&self) -> &'static str {
        match self {
            WellKnownFolder::Inbox => "inbox",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderId(pub String);

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of a subfolder listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSummary {
    pub id: FolderId,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId {
    pub id: String,
    pub change_key: Option<String>,
}

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            change_key: None,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    Text,
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    pub body_type: BodyType,
    pub text: String,
}

impl fmt::Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PropertyError {
    #[error("property {0} was not loaded for this item")]
    NotLoaded(ItemField),
}

/// A mailbox item as far as it has been loaded from the server.
///
/// Fields that were not part of the requested property set stay `None`;
/// the accessors turn that into a [`PropertyError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub subject: Option<String>,
    pub date_time_received: Option<DateTime<Utc>>,
    pub date_time_created: Option<DateTime<Utc>>,
    pub body: Option<Body>,
}

impl Item {
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            subject: None,
            date_time_received: None,
            date_time_created: None,
            body: None,
        }
    }

    pub fn subject(&self) -> Result<&str, PropertyError> {
        self.subject
            .as_deref()
            .ok_or(PropertyError::NotLoaded(ItemField::Subject))
    }

    pub fn body(&self) -> Result<&Body, PropertyError> {
        self.body
            .as_ref()
            .ok_or(PropertyError::NotLoaded(ItemField::Body))
    }

    /// Keep only the fields named by `set`
    pub fn project(&self, set: &PropertySet) -> Item {
        let keep = |field: ItemField| set.includes(field);
        Item {
            id: self.id.clone(),
            subject: self.subject.clone().filter(|_| keep(ItemField::Subject)),
            date_time_received: self
                .date_time_received
                .filter(|_| keep(ItemField::DateTimeReceived)),
            date_time_created: self
                .date_time_created
                .filter(|_| keep(ItemField::DateTimeCreated)),
            body: self.body.clone().filter(|_| keep(ItemField::Body)),
        }
    }
}

/// Result page of a find-items call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FindItemsResults {
    /// Number of matches on the server, which may exceed `items.len()`
    pub total_count: u32,
    pub items: Vec<Item>,
    pub more_available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn full_item() -> Item {
        Item {
            id: ItemId::new("AAMk1"),
            subject: Some("testing ews 1".to_string()),
            date_time_received: Some(Utc.with_ymd_and_hms(2019, 3, 1, 10, 0, 0).unwrap()),
            date_time_created: Some(Utc.with_ymd_and_hms(2019, 3, 1, 10, 0, 0).unwrap()),
            body: Some(Body {
                body_type: BodyType::Text,
                text: "hello".to_string(),
            }),
        }
    }

    #[test]
    fn test_version_round_trips_through_wire_name() {
        let version: ExchangeVersion = "Exchange2010_SP2".parse().unwrap();
        assert_eq!(version, ExchangeVersion::Exchange2010Sp2);
        assert_eq!(version.to_string(), "Exchange2010_SP2");
        assert_eq!(ExchangeVersion::default(), ExchangeVersion::Exchange2010Sp2);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let err = "Exchange2003".parse::<ExchangeVersion>().unwrap_err();
        assert_eq!(err, UnknownVersion("Exchange2003".to_string()));
    }

    #[test]
    fn test_body_not_loaded() {
        let item = Item::new(ItemId::new("x"));
        assert_eq!(
            item.body().unwrap_err(),
            PropertyError::NotLoaded(ItemField::Body)
        );
        assert!(item.subject().is_err());
    }

    #[test]
    fn test_id_only_projection_keeps_listed_fields() {
        let set = PropertySet::id_only()
            .with(ItemField::Subject)
            .with(ItemField::DateTimeReceived);
        let projected = full_item().project(&set);

        assert_eq!(projected.id, ItemId::new("AAMk1"));
        assert_eq!(projected.subject(), Ok("testing ews 1"));
        assert!(projected.date_time_received.is_some());
        assert!(projected.date_time_created.is_none());
        assert!(projected.body.is_none());
    }

    #[test]
    fn test_first_class_projection_keeps_body() {
        let projected = full_item().project(&PropertySet::first_class());
        assert_eq!(projected, full_item());
    }

    #[test]
    fn test_item_serde() {
        let json = serde_json::to_string(&full_item()).unwrap();
        let parsed: Item = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, full_item());
    }
}
