use crate::{
    pipeline::{Component, Pipeline},
    portal::PortalConfig,
    sink,
};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Error, Debug)]
pub enum Error {
    #[error("couldn't read the file {1}: {0}")]
    ReadFile(#[source] std::io::Error, PathBuf),

    #[error("invalid json: {0}")]
    Json(#[source] serde_json::Error),

    #[error("invalid toml: {0}")]
    Toml(#[source] toml::de::Error),

    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("no sink configured, expected one of outputFile or influxDB")]
    NoSink,

    #[error("both outputFile and influxDB are configured, expected only one")]
    AmbiguousSink,

    #[error("invalid sink {1}: {0}")]
    Sink(#[source] sink::Error, String),
}

/// Both config shapes in use: the flat one of the csv collector and the one
/// with nested `gymPortal`/`influxDB` sections.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ConfigRaw {
    gym_portal: Option<PortalConfig>,

    url: Option<String>,

    cookies: Option<String>,

    timeout: Option<u64>,

    timezone: Option<String>,

    keywords: Option<Vec<String>>,

    output_file: Option<String>,

    #[serde(rename = "influxDB", alias = "influxDb")]
    influx_db: Option<serde_json::Value>,
}

impl ConfigRaw {
    fn to_config(self) -> Result<Config, Error> {
        let portal = match self.gym_portal {
            Some(portal) => portal,
            None => PortalConfig {
                url: self.url.ok_or(Error::MissingField("url"))?,
                cookies: self.cookies.unwrap_or_default(),
                timeout: self.timeout,
            },
        };

        // keywords only select rows for the csv file, the metrics path always
        // gets every club
        let (sink, keywords) = match (self.output_file, self.influx_db) {
            (Some(path), None) => (("file", json!({ "path": path })), self.keywords),
            (None, Some(influx_db)) => {
                if self.keywords.is_some() {
                    warn!("keywords are ignored when writing to influxdb");
                }
                (("influxdb", influx_db), None)
            }
            (None, None) => return Err(Error::NoSink),
            (Some(_), Some(_)) => return Err(Error::AmbiguousSink),
        };

        Ok(Config {
            portal,
            timezone: self
                .timezone
                .filter(|tz| !tz.is_empty())
                .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
            keywords,
            sink,
        })
    }
}

#[derive(Debug)]
struct Config {
    portal: PortalConfig,

    timezone: String,

    keywords: Option<Vec<String>>,

    sink: (&'static str, serde_json::Value),
}

fn parse(content: &str, path: &Path) -> Result<ConfigRaw, Error> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(content).map_err(Error::Toml),
        _ => serde_json::from_str(content).map_err(Error::Json),
    }
}

pub fn read(file: impl AsRef<Path>) -> Result<Pipeline, Error> {
    let path = file.as_ref();
    let content =
        std::fs::read_to_string(path).map_err(|e| Error::ReadFile(e, path.to_path_buf()))?;
    let config = parse(&content, path)?.to_config()?;

    let (name, value) = config.sink;
    let component =
        sink::Registration::build(name, value).map_err(|e| Error::Sink(e, name.to_string()))?;

    Ok(Pipeline {
        portal: config.portal,
        timezone: config.timezone,
        keywords: config.keywords,
        sink: Component {
            name: name.to_string(),
            component,
        },
    })
}
