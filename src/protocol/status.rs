//! HTTP load-status endpoint of a device
//!
//! The device answers `GET /` with
//! `{"cpuload": "23.4 %", "cputemp": [{"0": "61.9 C"}, ...]}`. Units and
//! whitespace are stripped before the numbers are parsed.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, trace};

use super::error::LoadStatusError;
use crate::LoadStatus;

static UNIT_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s%C]").expect("unit pattern is a valid regex"));

#[derive(Debug, Deserialize)]
struct RawLoadStatus {
    cpuload: Value,

    #[serde(default)]
    cputemp: Vec<HashMap<String, Value>>,
}

/// Parse one load-status document
pub fn parse_load_status(body: &str) -> Result<LoadStatus, LoadStatusError> {
    let raw: RawLoadStatus =
        serde_json::from_str(body).map_err(|e| LoadStatusError::Parse(e.to_string()))?;

    let cpu = parse_reading(&raw.cpuload, "cpuload")?;

    let mut temperatures = BTreeMap::new();
    for entry in &raw.cputemp {
        for (core, reading) in entry {
            let core: u8 = core
                .trim()
                .parse()
                .map_err(|_| LoadStatusError::Parse(format!("invalid core number {core:?}")))?;
            temperatures.insert(core, parse_reading(reading, "cputemp")?);
        }
    }

    Ok(LoadStatus { cpu, temperatures })
}

fn parse_reading(value: &Value, field: &str) -> Result<f64, LoadStatusError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| LoadStatusError::Parse(format!("{field}: {n} is not a float"))),
        Value::String(s) => {
            let cleaned = UNIT_CHARS.replace_all(s, "");
            cleaned
                .parse()
                .map_err(|_| LoadStatusError::Parse(format!("{field}: cannot parse {s:?}")))
        }
        other => Err(LoadStatusError::Parse(format!("{field}: unexpected value {other}"))),
    }
}

/// Client for one device's status endpoint
#[derive(Debug, Clone)]
pub struct StatusClient {
    client: reqwest::Client,
    url: String,
    attempts: u32,
}

impl StatusClient {
    pub fn new(host: Ipv4Addr, port: u16, timeout: Duration, attempts: u32) -> Self {
        Self::with_url(format!("http://{host}:{port}/"), timeout, attempts)
    }

    pub fn with_url(url: impl Into<String>, timeout: Duration, attempts: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            url: url.into(),
            attempts: attempts.max(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch one sample, retrying transport failures up to the attempt limit
    ///
    /// An HTTP error status or an unparsable body is returned at once.
    #[instrument(level = "debug", skip(self), fields(url = %self.url))]
    pub async fn fetch(&self) -> Result<LoadStatus, LoadStatusError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once().await {
                Err(e) if e.is_transport() && attempt < self.attempts => {
                    debug!("attempt {attempt}/{} failed: {e}", self.attempts);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn fetch_once(&self) -> Result<LoadStatus, LoadStatusError> {
        trace!("requesting load status");
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadStatusError::Http(status.as_u16()));
        }

        let body = response.text().await?;
        parse_load_status(&body)
    }
}
