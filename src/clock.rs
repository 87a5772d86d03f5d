use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("unknown time zone {0}")]
    UnknownTimeZone(String),
}

fn zone(name: &str) -> Result<Tz, Error> {
    name.parse::<Tz>()
        .map_err(|_| Error::UnknownTimeZone(name.to_string()))
}

/// Current instant projected into the named zone.
pub fn now(name: &str) -> Result<DateTime<Tz>, Error> {
    let tz = zone(name)?;
    Ok(Utc::now().with_timezone(&tz))
}
