use chrono::DateTime;
use chrono_tz::Tz;
use serde::{
    de::{self, Unexpected},
    Deserialize, Deserializer,
};

/// One club's reading from a single poll of the portal.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ClubRecord {
    #[serde(rename = "ClubAddress")]
    pub address: String,

    #[serde(rename = "ClubName", default)]
    pub name: Option<String>,

    #[serde(rename = "UsersCountCurrentlyInClub", deserialize_with = "count")]
    pub occupancy: i64,
}

/// Counts are stored as the signed 64-bit integers the metric store takes, so
/// anything negative or past `i64::MAX` is refused while decoding.
fn count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let count = i64::deserialize(deserializer)?;

    if count < 0 {
        return Err(de::Error::invalid_value(
            Unexpected::Signed(count),
            &"a non-negative count",
        ));
    }

    Ok(count)
}

pub type ClubBatch = Vec<ClubRecord>;

/// A batch together with the instant it was taken at.
#[derive(Debug)]
pub struct Snapshot {
    pub taken_at: DateTime<Tz>,

    pub clubs: ClubBatch,
}

impl Snapshot {
    pub fn new(taken_at: DateTime<Tz>, clubs: ClubBatch) -> Self {
        Self { taken_at, clubs }
    }

    pub fn len(&self) -> usize {
        self.clubs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClubRecord> {
        self.clubs.iter()
    }
}

#[cfg(test)]
pub(crate) fn club(address: &str, name: Option<&str>, occupancy: i64) -> ClubRecord {
    ClubRecord {
        address: address.to_string(),
        name: name.map(str::to_string),
        occupancy,
    }
}
