use super::VERSION;
use crate::{Sample, TimeSeries};
use chrono::prelude::*;
use clap::{value_parser, Arg, Command};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Deadline for a single poll, the only timing control besides the cadence.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-iteration failures; both kinds are logged and skipped,
/// the poll loop keeps its cadence.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response format: {0}")]
    Malformed(String),
}

/// The canonical response shape of the endpoint.
/// Fields are kept loose here so that validation can
/// distinguish missing, null and wrongly typed values.
#[derive(Debug, Deserialize)]
struct WireReading {
    timestamp: Option<String>,
    temp: Option<serde_json::Value>,
    humidity: Option<serde_json::Value>,
}

/// Fixed-cadence best-effort poller of the sensor endpoint.
/// One request in flight at a time, sleep between polls,
/// no backoff and no retries.
pub struct Collector {
    client: reqwest::blocking::Client,
    base_url: String,
    iterations: u32,
    delay: Duration,
}

impl Collector {
    pub fn new(base_url: &str, iterations: u32, delay_seconds: u64) -> Result<Collector, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Collector {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            iterations,
            delay: Duration::from_secs(delay_seconds),
        })
    }

    /// Poll the endpoint `iterations` times, sleeping `delay` between polls,
    /// also after the last one.
    /// Samples are appended in the order the responses were received.
    /// Failed or invalid polls are reported and skipped, never fatal.
    pub fn collect(&self) -> TimeSeries {
        let mut series = TimeSeries::new(self.iterations as usize);
        println!(
            "connecting to {} to collect data, {} iterations",
            self.base_url, self.iterations
        );
        for _ in 0..self.iterations {
            match self.poll_once() {
                Ok(sample) => {
                    println!("fetched: {}", sample);
                    series.samples.push(sample);
                }
                Err(e) => println!("skipping iteration: {}", e),
            }
            std::thread::sleep(self.delay);
        }
        series
    }

    fn poll_once(&self) -> Result<Sample, CollectError> {
        let response = self
            .client
            .get(format!("{}/get_data", self.base_url))
            .send()?
            .error_for_status()?;
        let body = response.text()?;
        let wire: WireReading =
            serde_json::from_str(&body).map_err(|e| CollectError::Malformed(e.to_string()))?;
        sample_from_wire(wire, Local::now().date_naive())
    }
}

/// Validate one decoded response and turn it into a Sample.
/// Accepted only with a non-null timestamp and a temp field
/// that is a sequence of numbers; humidity is taken when it is
/// a sequence of numbers and left empty otherwise.
fn sample_from_wire(wire: WireReading, today: NaiveDate) -> Result<Sample, CollectError> {
    let raw_ts = wire
        .timestamp
        .ok_or_else(|| CollectError::Malformed("missing or null timestamp".to_owned()))?;
    let timestamp = normalize_timestamp(&raw_ts, today)
        .ok_or_else(|| CollectError::Malformed(format!("unparseable timestamp {:?}", raw_ts)))?;
    let temp = number_sequence(wire.temp.as_ref())
        .ok_or_else(|| CollectError::Malformed("temp is not a sequence of numbers".to_owned()))?;
    let humidity = number_sequence(wire.humidity.as_ref()).unwrap_or_default();
    Ok(Sample {
        timestamp,
        temp,
        humidity,
    })
}

fn number_sequence(value: Option<&serde_json::Value>) -> Option<Vec<f64>> {
    value?.as_array()?.iter().map(|e| e.as_f64()).collect()
}

/// The endpoint may report a full datetime or a bare time of day.
/// A bare time of day is stamped with the local wall-clock date
/// at the moment of receipt, the one place where the client and
/// server clocks mix.
pub fn normalize_timestamp(raw: &str, today: NaiveDate) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(t) = NaiveTime::parse_from_str(raw, "%H:%M:%S") {
        return Some(today.and_time(t));
    }
    None
}

/// Takes the CLI arguments to control the collector application.
/// When a replay file is given, live collection is skipped entirely
/// and the saved document is plotted instead.
pub fn parse_cli() -> (String, u32, u64, Option<PathBuf>, bool) {
    let arg_ip_port = Arg::new("ip_port")
        .help("address and port of the temp server (host:port)")
        .short('t')
        .long("ip-port")
        .num_args(1)
        .default_value("192.168.129.202:8088");
    let arg_iters = Arg::new("iters")
        .help("number of iterations of data to collect")
        .short('n')
        .long("iters")
        .num_args(1)
        .value_parser(value_parser!(u32))
        .default_value("5");
    let arg_delay = Arg::new("delay")
        .help("delay between iterations, in seconds")
        .short('d')
        .long("delay")
        .num_args(1)
        .value_parser(value_parser!(u64))
        .default_value("5");
    let arg_replay = Arg::new("replay")
        .help("instead of collecting, plot a previously saved data json file")
        .short('r')
        .long("replay")
        .num_args(1)
        .value_parser(value_parser!(PathBuf));
    let arg_verbose = Arg::new("verbose")
        .help("print verbose information")
        .short('v')
        .long("verbose")
        .num_args(0..)
        .required(false);
    let cli_args = Command::new("temphum_collect")
        .version(VERSION.unwrap_or("unknown"))
        .about("cli app to collect and plot temp/humidity data from the sensor server")
        .arg(arg_ip_port)
        .arg(arg_iters)
        .arg(arg_delay)
        .arg(arg_replay)
        .arg(arg_verbose)
        .get_matches();
    let val_ip_port = cli_args.get_one::<String>("ip_port").unwrap().to_owned();
    // iters and delay always have a value because defaults are set
    let val_iters = cli_args.get_one::<u32>("iters").unwrap().to_owned();
    let val_delay = cli_args.get_one::<u64>("delay").unwrap().to_owned();
    let val_replay = cli_args.get_one::<PathBuf>("replay").map(|p| p.to_owned());
    let val_verbose: bool = cli_args.contains_id("verbose");
    (val_ip_port, val_iters, val_delay, val_replay, val_verbose)
}
