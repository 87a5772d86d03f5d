use std::time::Duration;

use reqwest::{blocking::Client, header::COOKIE, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::club::ClubBatch;

#[derive(Error, Debug)]
pub enum Error {
    #[error("error building http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("error creating a request to {1}: {0}")]
    Request(#[source] reqwest::Error, String),

    #[error("error making request: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("response status != 200: {status}, body: {}", String::from_utf8_lossy(.body))]
    UnexpectedStatus { status: u16, body: Vec<u8> },

    #[error("failed to parse json: {0}")]
    Decode(#[source] serde_json::Error),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortalConfig {
    pub url: String,

    #[serde(default)]
    pub cookies: String,

    /// Request timeout in seconds. Unset means the request may block forever.
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl PortalConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

#[derive(Deserialize, Debug)]
struct UsersInClubResponse {
    #[serde(rename = "UsersInClubList", default)]
    clubs: ClubBatch,
}

/// Issues a single GET against the portal with `cookies` as the verbatim
/// `Cookie` header and decodes the club list from the body.
///
/// The body is always read to the end before the response is dropped, also
/// when the status is not 200.
pub fn fetch(url: &str, cookies: &str, timeout: Option<Duration>) -> Result<ClubBatch, Error> {
    let client = Client::builder()
        .timeout(timeout)
        .build()
        .map_err(Error::Client)?;

    let request = client
        .get(url)
        .header(COOKIE, cookies)
        .build()
        .map_err(|e| Error::Request(e, url.to_string()))?;

    info!(url = url, "fetching club occupancy");

    let response = client.execute(request).map_err(Error::Transport)?;
    let status = response.status();

    if status != StatusCode::OK {
        // whatever part of the body arrived, the status is what gets reported
        let body = response.bytes().map(|b| b.to_vec()).unwrap_or_default();

        return Err(Error::UnexpectedStatus {
            status: status.as_u16(),
            body,
        });
    }

    let body = response.bytes().map_err(Error::Transport)?;

    let decoded: UsersInClubResponse = serde_json::from_slice(&body).map_err(Error::Decode)?;
    debug!(clubs = decoded.clubs.len(), "decoded club list");

    Ok(decoded.clubs)
}
