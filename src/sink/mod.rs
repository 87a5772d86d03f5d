use std::collections::HashMap;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::club::Snapshot;

mod file;
mod influxdb;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown sink {0}")]
    Unknown(String),

    #[error("invalid configuration: {0}")]
    Json(#[source] serde_json::Error),

    #[error("invalid configuration for {1}: {0}")]
    Config(#[source] Box<dyn std::error::Error>, String),
}

pub type SinkResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

pub trait Sink {
    fn write(&self, snapshot: &Snapshot) -> SinkResult<()>;
}

pub trait SinkConfig: Send + Sync {
    fn build(self) -> SinkResult<Box<dyn Sink>>;
}

pub struct Registration {
    name: &'static str,

    builder: fn(&str, serde_json::Value) -> Result<Box<dyn Sink>, Error>,
}

impl Registration {
    pub const fn new<SC>(name: &'static str) -> Self
    where
        SC: SinkConfig + DeserializeOwned,
    {
        let builder = |name: &str, value: serde_json::Value| {
            let config: SC = serde_json::from_value(value).map_err(Error::Json)?;
            config
                .build()
                .map_err(|e| Error::Config(e, name.to_string()))
        };

        Self { name, builder }
    }

    pub fn build(name: &str, value: serde_json::Value) -> Result<Box<dyn Sink>, Error> {
        let registrations: HashMap<&'static str, &Registration> = inventory::iter::<Registration>()
            .map(|r| (r.name, r))
            .collect();

        registrations
            .get(name)
            .ok_or(Error::Unknown(name.to_string()))
            .and_then(|r| {
                let builder = r.builder;

                builder(name, value)
            })
    }
}

inventory::collect!(Registration);
