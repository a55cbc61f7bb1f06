//! Live credit-migration feed.
//!
//! The feed returns one-period migration frequencies as a flat map keyed
//! `<from>_to_<to>` over the labels `stable`, `elevated`, `high`, `critical`,
//! `default`. Rows are normalised and the default row forced absorbing before the
//! table is handed to the core as a pre-resolved [`SnapshotSource`].
//!
//! All I/O happens here, in the service layer; the numeric core never sees the
//! network.

use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::chain::{BaseMatrix, SnapshotSource, normalize_feed_rows};
use crate::domain::{RiskState, STATE_COUNT};
use crate::error::DataUnavailable;

const DEFAULT_BASE_URL: &str = "https://api.bloomberg.com/v1";
const MIGRATION_PATH: &str = "credit/migration";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const API_KEY_VAR: &str = "MIGRATION_API_KEY";
pub const API_URL_VAR: &str = "MIGRATION_API_URL";

/// `data_source` tag for matrices built from the live feed.
pub const LIVE_SOURCE_ID: &str = "live";

pub struct MigrationClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl MigrationClient {
    /// Read credentials from the environment (and `.env`).
    ///
    /// A missing key means the live feed is unavailable, not a usage error.
    pub fn from_env() -> Result<Self, DataUnavailable> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| DataUnavailable::new(format!("{API_KEY_VAR} not set")))?;
        let base_url = std::env::var(API_URL_VAR).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(api_key, base_url)
    }

    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, DataUnavailable> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DataUnavailable::new(format!("http client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the migration table visible at `as_of_date`.
    pub fn fetch_snapshot(
        &self,
        sector: Option<&str>,
        as_of_date: NaiveDate,
    ) -> Result<SnapshotSource, DataUnavailable> {
        let url = format!("{}/{MIGRATION_PATH}", self.base_url);
        let mut req = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("as_of", as_of_date.to_string())]);
        if let Some(sector) = sector {
            req = req.query(&[("sector", sector)]);
        }

        let resp = req.send().map_err(|e| {
            warn!(%e, "migration feed request failed");
            DataUnavailable::new(format!("migration feed request failed: {e}"))
        })?;
        if !resp.status().is_success() {
            return Err(DataUnavailable::new(format!(
                "migration feed returned status {}",
                resp.status()
            )));
        }

        let body: MigrationResponse = resp
            .json()
            .map_err(|e| DataUnavailable::new(format!("failed to parse migration feed: {e}")))?;

        let source = snapshot_from_response(body, as_of_date)?;
        info!(published = %source.published(), "live migration table fetched");
        Ok(source)
    }
}

#[derive(Debug, Deserialize)]
struct MigrationResponse {
    migration_rates: HashMap<String, f64>,
    #[serde(default)]
    as_of: Option<NaiveDate>,
}

fn snapshot_from_response(
    body: MigrationResponse,
    requested: NaiveDate,
) -> Result<SnapshotSource, DataUnavailable> {
    let matrix = parse_migration_rates(&body.migration_rates)?;
    Ok(SnapshotSource::new(
        LIVE_SOURCE_ID,
        body.as_of.unwrap_or(requested),
        matrix,
    ))
}

/// Turn a `<from>_to_<to>` rate map into a normalised base matrix.
///
/// Every transient-row key must be present; the default row is ignored and
/// replaced by the absorbing row.
pub fn parse_migration_rates(rates: &HashMap<String, f64>) -> Result<BaseMatrix, DataUnavailable> {
    let mut raw = [[0.0; STATE_COUNT]; STATE_COUNT];
    for from in RiskState::TRANSIENT {
        for to in RiskState::ALL {
            let key = format!("{}_to_{}", from.feed_label(), to.feed_label());
            raw[from.index()][to.index()] = *rates
                .get(&key)
                .ok_or_else(|| DataUnavailable::new(format!("migration feed is missing '{key}'")))?;
        }
    }
    normalize_feed_rows(raw)
}
