use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::club::ClubRecord;

/// A metric point with integer fields only, which is all a club reading has.
/// Tags and fields are kept sorted so a point always renders the same way.
#[derive(Debug)]
pub struct Point {
    pub name: String,

    pub tags: BTreeMap<String, String>,

    pub fields: BTreeMap<String, i64>,

    pub timestamp: Option<DateTime<Utc>>,
}

pub struct PointBuilder(Point);

impl PointBuilder {
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl AsRef<str>, value: i64) -> Self {
        self.0.fields.insert(key.as_ref().to_string(), value);
        self
    }

    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.0.timestamp = Some(ts);
        self
    }

    pub fn build(self) -> Point {
        self.0
    }
}

impl Point {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),

            tags: BTreeMap::new(),

            fields: BTreeMap::new(),

            timestamp: None,
        }
    }

    pub fn builder(name: impl Into<String>) -> PointBuilder {
        PointBuilder(Self::new(name))
    }
}

/// Stamped with the conversion time, not with the time of the poll.
impl From<&ClubRecord> for Point {
    fn from(club: &ClubRecord) -> Self {
        Point::builder("club")
            .tag("address", club.address.clone())
            .tag("name", club.name.clone().unwrap_or_default())
            .field("occupancy", club.occupancy)
            .timestamp(Utc::now())
            .build()
    }
}
