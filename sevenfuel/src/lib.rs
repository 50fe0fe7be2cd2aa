//!
//! This crate polls the fuel price feed of a single 7-Eleven store in Australia and keeps the
//! history of one fuel grade in a CSV file.
//!
//! The entry point of the crate is [PriceLogger::new], built from a [Config]. A single poll cycle
//! is run with [PriceLogger::fetch_and_log], and [PriceLogger::watch] repeats it periodically.
//!
//! Note that quotes in the feed don't carry the name of their fuel grade: the grade is selected
//! by its position in the array ([Config::grade_index]), and nothing checks that the upstream
//! service keeps this order.
//!

use std::{
    fmt::Write as _,
    fs::OpenOptions,
    future::Future,
    io::{Read, Write},
    path::Path,
    str::FromStr,
};

use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::Deserialize;
use tokio::time::MissedTickBehavior;

mod config;

pub use config::{
    Config, ConfigBuilder, ConfigError, DEFAULT_BASE_URL, DEFAULT_GRADE_INDEX,
    DEFAULT_GRADE_LABEL, DEFAULT_OUTPUT_PATH, DEFAULT_POLL_INTERVAL, DEFAULT_STORE_ID,
    DEFAULT_STORE_LABEL,
};

/// Format of the timestamps written in the CSV file and on the console.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("error while fetching data")]
    Network(#[from] reqwest::Error),
    #[error("feed answered with status {0}")]
    Status(reqwest::StatusCode),
    #[error("could not parse the price feed")]
    Parsing(#[from] serde_json::Error),
    #[error("feed has no quote at index {index} (only {len} quotes)")]
    MissingQuote { index: usize, len: usize },
    #[error("quote at index {index} does not have a numeric price")]
    InvalidPrice {
        index: usize,
        #[source]
        err: serde_json::Error,
    },
    #[error("error while writing the price log")]
    IO(#[from] std::io::Error),
    #[error("row is not of the form <timestamp>,<price>: {0}")]
    InvalidRow(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Formats the error along with all its sources, separated by `: `.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        let _ = write!(message, ": {err}");
        source = err.source();
    }
    message
}

/// A single entry of the price feed. The feed carries more fields, but only the price is read.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QuoteRecord {
    /// Price in tenths of a cent per litre
    pub price: f64,
}

impl QuoteRecord {
    /// Price in cents per litre
    pub fn display_price(&self) -> f64 {
        self.price / 10.
    }
}

/// Parsed response of the price feed: all the quotes of a store, in the order of the feed.
///
/// Quotes are only decoded when accessed, so a malformed quote only matters if it is the one that
/// is read.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteSet {
    data: Vec<serde_json::Value>,
}

impl QuoteSet {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn quote(&self, index: usize) -> Result<QuoteRecord> {
        let raw = self.data.get(index).ok_or(Error::MissingQuote {
            index,
            len: self.data.len(),
        })?;

        QuoteRecord::deserialize(raw).map_err(|err| Error::InvalidPrice { index, err })
    }

    /// Price in cents per litre of the quote at `index`
    pub fn price_at(&self, index: usize) -> Result<f64> {
        self.quote(index).map(|q| q.display_price())
    }
}

/// A price read at a particular point in time. This is one row of the CSV file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuelReading {
    /// Local wall-clock time, to the second
    pub timestamp: NaiveDateTime,
    /// Price in cents per litre
    pub price: f64,
}

impl FuelReading {
    /// Create a reading timestamped with the current local time.
    pub fn now(price: f64) -> Self {
        Self {
            timestamp: Local::now().naive_local().trunc_subsecs(0),
            price,
        }
    }

    /// Row of the CSV file, without line terminator. The price is rounded to one decimal, so a
    /// raw price that is not a whole number of tenths of a cent loses its remainder.
    pub fn csv_row(&self) -> String {
        format!("{},{:.1}", self.timestamp.format(TIMESTAMP_FORMAT), self.price)
    }
}

impl FromStr for FuelReading {
    type Err = Error;

    fn from_str(row: &str) -> Result<Self> {
        let invalid = || Error::InvalidRow(row.into());

        let (timestamp, price) = row.trim_end().split_once(',').ok_or_else(invalid)?;

        Ok(Self {
            timestamp: NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
                .map_err(|_| invalid())?,
            price: price.parse().map_err(|_| invalid())?,
        })
    }
}

/// Outcome of a single poll cycle.
#[derive(Debug)]
pub enum Cycle {
    /// The reading was appended to the CSV file
    Logged(FuelReading),
    /// Nothing was appended
    Failed(Error),
}

impl Cycle {
    pub fn is_logged(&self) -> bool {
        matches!(self, Cycle::Logged(_))
    }

    /// Human readable summary of the cycle, as shown on the console.
    pub fn console_line(&self, config: &Config) -> String {
        match self {
            Cycle::Logged(reading) => format!(
                "{} - {} Price at {}: {:.1}¢/L (Logged)",
                reading.timestamp.format(TIMESTAMP_FORMAT),
                config.grade_label(),
                config.store_label(),
                reading.price,
            ),
            Cycle::Failed(e) => format!("Error fetching data: {}", error_chain(e)),
        }
    }
}

fn append_row(path: &Path, reading: &FuelReading) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    writeln!(file, "{}", reading.csv_row())?;
    file.flush()?;

    Ok(())
}

/// Fetches the price of one fuel grade at one store, and appends it to a CSV file.
pub struct PriceLogger {
    config: Config,
    client: reqwest::Client,
}

impl PriceLogger {
    pub fn new(config: Config) -> Result<Self> {
        let mut client = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            client = client.timeout(timeout);
        }

        Ok(Self {
            client: client.build()?,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// URL of the price feed of the configured store.
    pub fn feed_url(&self) -> String {
        format!(
            "{}/fuelPrices?storeNo={}",
            self.config.base_url(),
            self.config.store_id()
        )
    }

    /// Fetch all the quotes of the store.
    pub async fn fetch_quotes(&self) -> Result<QuoteSet> {
        let url = self.feed_url();
        log::debug!("fetching quotes at {url}");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status));
        }

        let body = response.bytes().await?;
        let quotes = QuoteSet::from_slice(&body)?;
        log::trace!("feed returned {} quotes", quotes.len());

        Ok(quotes)
    }

    /// Fetch the price of the configured grade, timestamped once the feed has answered.
    pub async fn fetch_reading(&self) -> Result<FuelReading> {
        let quotes = self.fetch_quotes().await?;
        let price = quotes.price_at(self.config.grade_index())?;

        Ok(FuelReading::now(price))
    }

    /// Append a single row to the CSV file, creating it if needed. The file is closed before
    /// returning.
    pub fn append(&self, reading: &FuelReading) -> Result<()> {
        append_row(self.config.output_path(), reading)
    }

    /// Fetch a reading and append it. Nothing is written if any step fails.
    pub async fn poll(&self) -> Result<FuelReading> {
        let reading = self.fetch_reading().await?;
        self.append(&reading)?;

        Ok(reading)
    }

    /// Run a single poll cycle. Failures are logged and returned as [Cycle::Failed], this never
    /// aborts the caller.
    pub async fn fetch_and_log(&self) -> Cycle {
        match self.poll().await {
            Ok(reading) => {
                log::info!(
                    "logged {:.1} for store {} to {}",
                    reading.price,
                    self.config.store_id(),
                    self.config.output_path().display()
                );
                Cycle::Logged(reading)
            }
            Err(e) => {
                log::error!("poll cycle failed: {}", error_chain(&e));
                Cycle::Failed(e)
            }
        }
    }

    /// Run a poll cycle immediately, then once every [Config::poll_interval], until `shutdown`
    /// resolves. Cycles never overlap, and a cycle still in flight when `shutdown` resolves is
    /// dropped before writing anything.
    pub async fn watch<S, F>(&self, shutdown: S, mut on_cycle: F)
    where
        S: Future<Output = ()>,
        F: FnMut(&Cycle),
    {
        tokio::pin!(shutdown);

        let mut timer = tokio::time::interval(self.config.poll_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = timer.tick() => (),
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                cycle = self.fetch_and_log() => on_cycle(&cycle),
            }
        }

        log::info!("stopped polling {}", self.feed_url());
    }
}
