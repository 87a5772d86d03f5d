use std::{
    sync::mpsc::{self, SendError, Sender},
    thread::{self, JoinHandle},
};

use reqwest::{
    blocking::Client,
    header::{AUTHORIZATION, CONTENT_TYPE},
    StatusCode, Url,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, field, info};

use crate::{
    club::Snapshot,
    point::Point,
    sink::Registration,
};

use super::{Sink, SinkConfig, SinkResult};

const DEFAULT_BATCH_SIZE: usize = 5000;
const MAX_BATCH_SIZE: usize = 100_000;

const MEASUREMENT_ESCAPES: &[char] = &[',', ' '];
const KEY_ESCAPES: &[char] = &[',', '=', ' '];

#[derive(Error, Debug)]
enum Error {
    #[error("error building http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to send request: {0}")]
    Request(#[source] reqwest::Error),

    #[error("write request resulted in a non-success status code {0} with error: {1}")]
    Write(StatusCode, String),

    #[error("invalid batch size {0}, expected a value between 1 and 100000")]
    BatchSize(usize),
}

fn escape(s: &str, escapes: &[char]) -> String {
    let mut escaped = String::with_capacity(s.len());

    for c in s.chars() {
        if escapes.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}

/// Renders one line of line protocol. Fields are written as integers (`10i`),
/// empty tag values are left out since line protocol cannot carry them.
fn line(point: &Point) -> String {
    let mut line = escape(&point.name, MEASUREMENT_ESCAPES);

    for (k, v) in point.tags.iter().filter(|(_, v)| !v.is_empty()) {
        line.push_str(&format!(
            ",{}={}",
            escape(k, KEY_ESCAPES),
            escape(v, KEY_ESCAPES)
        ));
    }

    let fields = point
        .fields
        .iter()
        .map(|(k, v)| format!("{}={v}i", escape(k, KEY_ESCAPES)))
        .collect::<Vec<_>>()
        .join(",");
    line.push(' ');
    line.push_str(&fields);

    if let Some(ns) = point.timestamp.and_then(|ts| ts.timestamp_nanos_opt()) {
        line.push_str(&format!(" {ns}"));
    }

    line
}

fn write_endpoint(url: &str, org: &str, bucket: &str) -> SinkResult<Url> {
    let mut endpoint = Url::parse(&format!("{}/api/v2/write", url.trim_end_matches('/')))?;

    endpoint
        .query_pairs_mut()
        .append_pair("org", org)
        .append_pair("bucket", bucket)
        .append_pair("precision", "ns");

    Ok(endpoint)
}

fn send(client: &Client, endpoint: &Url, token: &str, lines: Vec<String>) -> Result<(), Error> {
    debug!("sending {} points", lines.len());

    let response = client
        .post(endpoint.clone())
        .header(AUTHORIZATION, format!("Token {token}"))
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(lines.join("\n"))
        .send()
        .map_err(Error::Request)?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Write(
            status,
            response
                .text()
                .unwrap_or("Failed to retrieve response text".to_string()),
        ));
    }

    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct WriteReport {
    points: usize,

    errors: usize,
}

/// Buffers lines and hands full batches to a writer thread. Failed writes go
/// to an error channel that a second thread drains and logs, so a failure
/// never blocks or aborts the points submitted after it.
struct WriteSession {
    buffer: Vec<String>,

    batch_size: usize,

    points: usize,

    batches: Option<Sender<Vec<String>>>,

    writer: Option<JoinHandle<()>>,

    drain: Option<JoinHandle<usize>>,
}

impl WriteSession {
    fn open(client: Client, endpoint: Url, token: String, batch_size: usize) -> Self {
        let (batches, batch_rx) = mpsc::channel::<Vec<String>>();
        let (errors, error_rx) = mpsc::channel::<Error>();

        let drain = thread::spawn(move || {
            let mut count = 0;

            for e in error_rx {
                count += 1;
                error!(error = field::display(&e), "influxdb error");
            }

            count
        });

        let writer = thread::spawn(move || {
            for batch in batch_rx {
                if let Err(e) = send(&client, &endpoint, &token, batch) {
                    if let Err(SendError(e)) = errors.send(e) {
                        error!(error = field::display(&e), "influxdb error");
                    }
                }
            }
        });

        Self {
            buffer: Vec::new(),
            batch_size,
            points: 0,
            batches: Some(batches),
            writer: Some(writer),
            drain: Some(drain),
        }
    }

    fn write_point(&mut self, line: String) {
        self.buffer.push(line);
        self.points += 1;

        if self.buffer.len() >= self.batch_size {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.buffer);

        if let Some(batches) = &self.batches {
            if batches.send(batch).is_err() {
                error!("influxdb writer stopped, dropping batch");
            }
        }
    }

    /// Flushes what is left and waits for every pending write and error.
    fn close(mut self) -> WriteReport {
        self.finish()
    }

    fn finish(&mut self) -> WriteReport {
        self.flush();
        self.batches.take();

        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                error!("influxdb writer panicked");
            }
        }

        let errors = self
            .drain
            .take()
            .and_then(|drain| drain.join().ok())
            .unwrap_or(0);

        WriteReport {
            points: self.points,
            errors,
        }
    }
}

impl Drop for WriteSession {
    fn drop(&mut self) {
        if self.batches.is_some() {
            self.finish();
        }
    }
}

struct InfluxDB {
    endpoint: Url,

    token: String,

    batch_size: usize,
}

impl InfluxDB {
    fn open(&self) -> Result<WriteSession, Error> {
        let client = Client::builder().build().map_err(Error::Client)?;

        Ok(WriteSession::open(
            client,
            self.endpoint.clone(),
            self.token.clone(),
            self.batch_size,
        ))
    }
}

impl Sink for InfluxDB {
    fn write(&self, snapshot: &Snapshot) -> SinkResult<()> {
        let mut session = self.open()?;

        for club in snapshot.iter() {
            session.write_point(line(&Point::from(club)));
        }

        let report = session.close();
        info!(
            points = report.points,
            errors = report.errors,
            "wrote points to influxdb"
        );

        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Config {
    url: String,

    auth_token: String,

    org: String,

    bucket: String,

    #[serde(default)]
    batch_size: Option<usize>,
}

impl SinkConfig for Config {
    fn build(self) -> SinkResult<Box<dyn Sink>> {
        let batch_size = self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if !(1..=MAX_BATCH_SIZE).contains(&batch_size) {
            return Err(Error::BatchSize(batch_size).into());
        }

        Ok(Box::new(InfluxDB {
            endpoint: write_endpoint(&self.url, &self.org, &self.bucket)?,

            token: self.auth_token,

            batch_size,
        }))
    }
}

inventory::submit! {
    Registration::new::<Config>("influxdb")
}
