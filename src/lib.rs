use chrono::prelude::*;
use plotters::coord::types::RangedDateTime;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
pub mod collect;
pub mod sim_source;

// constants
pub const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");
pub const TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Serialize and parse the sample timestamps with the canonical
/// second-precision format, both on the wire and on disk.
mod ts_serde {
    use super::TIMESTAMP_FMT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&ts.format(TIMESTAMP_FMT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, TIMESTAMP_FMT).map_err(serde::de::Error::custom)
    }
}

/// One accepted poll of the sensor endpoint:
/// a timestamp plus the parallel per-sensor readings,
/// index = sensor id for both quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(with = "ts_serde")]
    pub timestamp: NaiveDateTime,
    pub temp: Vec<f64>,
    pub humidity: Vec<f64>,
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} temp {:?} humidity {:?}",
            self.timestamp.format(TIMESTAMP_FMT),
            self.temp,
            self.humidity
        )
    }
}

/// Errors for reading and writing the persisted series.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("could not decode json: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// The main struct for the collected time series.
/// Samples are kept strictly in the order they were received,
/// no re-sorting by timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    /// Initiate a new TimeSeries instance
    /// using the given capacity for the sample vector.
    pub fn new(capacity: usize) -> TimeSeries {
        TimeSeries {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of sensors, taken from the first sample's temperature array.
    /// All samples are assumed to share it.
    pub fn sensor_count(&self) -> usize {
        self.samples.first().map_or(0, |s| s.temp.len())
    }

    /// The first sample's timestamp with the separators stripped,
    /// used to stamp the data and chart file names.
    pub fn file_stamp(&self) -> Option<String> {
        self.samples
            .first()
            .map(|s| s.timestamp.format("%Y%m%d_%H%M%S").to_string())
    }

    pub fn data_filename(&self) -> Option<String> {
        self.file_stamp()
            .map(|stamp| format!("{}_collected_data.json", stamp))
    }

    /// Load a previously saved series from a json array on disk.
    /// Report a missing file and a bad document as distinct errors,
    /// the caller decides whether to proceed.
    pub fn from_json<P>(fin: P) -> Result<TimeSeries, StoreError>
    where
        P: AsRef<Path>,
    {
        let file = File::open(&fin).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(fin.as_ref().to_path_buf())
            } else {
                StoreError::Io(e)
            }
        })?;
        let buf = BufReader::new(file);
        let samples: Vec<Sample> = serde_json::from_reader(buf)?;
        Ok(TimeSeries { samples })
    }

    /// Write the series to the given path as an indented json array,
    /// mirroring the in-memory series exactly.
    pub fn to_json<P>(&self, fout: P) -> Result<(), StoreError>
    where
        P: AsRef<Path>,
    {
        let file = File::create(fout)?;
        let mut buf = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut buf, &self.samples)?;
        buf.flush()?;
        Ok(())
    }

    /// Plot the series to svg, one chart per quantity:
    /// temperature and humidity, one line per sensor index,
    /// sharing the time axis domain.
    /// An empty series plots nothing and returns no paths.
    pub fn plot_charts<P>(&self, dir: P) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>>
    where
        P: AsRef<Path>,
    {
        if self.is_empty() {
            println!("no data to plot");
            return Ok(Vec::new());
        }
        let stamp = self.file_stamp().unwrap_or_default();
        let temp_file = dir.as_ref().join(format!("temp_plots_{}.svg", stamp));
        let humidity_file = dir.as_ref().join(format!("humidity_plots_{}.svg", stamp));
        self.plot_lines(&temp_file, "Temperature", "temp", |s| &s.temp)?;
        self.plot_lines(&humidity_file, "Humidity", "humidity", |s| &s.humidity)?;
        Ok(vec![temp_file, humidity_file])
    }

    fn plot_lines<P>(
        &self,
        fout: P,
        title: &str,
        label: &str,
        values: fn(&Sample) -> &[f64],
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        P: AsRef<Path>,
    {
        let (mut xmin, mut xmax) = match min_and_max(self.samples.iter().map(|s| s.timestamp)) {
            Some(minmax) => minmax,
            None => return Ok(()),
        };
        if xmin == xmax {
            // a single sample still needs a non-degenerate axis
            xmin = xmin - chrono::Duration::minutes(1);
            xmax = xmax + chrono::Duration::minutes(1);
        }
        let num_sensors = self.sensor_count();
        let (ymin, ymax) = match min_and_max(
            self.samples
                .iter()
                .flat_map(|s| values(s).iter().copied())
                .filter(|y| y.is_finite()),
        ) {
            Some(minmax) => minmax,
            None => (0., 1.),
        };
        let ypad = ((ymax - ymin) / 10f64).max(0.5);
        let ymin = ymin - ypad;
        let ymax = ymax + ypad;
        let start = self.samples[0].timestamp.format(TIMESTAMP_FMT);
        let end = self.samples[self.samples.len() - 1]
            .timestamp
            .format(TIMESTAMP_FMT);
        let root = SVGBackend::new(&fout, (1600, 800)).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(50)
            .caption(
                format!("{} Data: {} - {}", title, start, end),
                ("sans-serif", 30),
            )
            .x_label_area_size(40)
            .y_label_area_size(100)
            .build_cartesian_2d(RangedDateTime::from(xmin..xmax), ymin..ymax)?;
        chart
            .configure_mesh()
            .light_line_style(TRANSPARENT)
            .bold_line_style(RGBColor(100, 100, 100).mix(0.5).stroke_width(2))
            .set_all_tick_mark_size(2)
            .label_style(("sans-serif", 20))
            .y_desc(title.to_lowercase())
            .x_labels(hourly_label_count(xmax - xmin))
            .y_labels(25)
            .x_label_formatter(&|x| x.format("%a %H:%M").to_string())
            .y_label_formatter(&|y: &f64| format!("{:5.1}", y))
            .x_desc("datetime")
            .draw()?;
        for i in 0..num_sensors {
            let color = Palette99::pick(i).to_rgba();
            chart
                .draw_series(LineSeries::new(
                    self.samples.iter().map(|s| (s.timestamp, values(s)[i])),
                    &color,
                ))?
                .label(format!("{}[{}]", label, i))
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
        root.present()?;
        Ok(())
    }
}

impl fmt::Display for TimeSeries {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for sample in self.samples.iter() {
            writeln!(f, "{}", sample)?;
        }
        Ok(())
    }
}

/// One x label per hour of span, clamped to keep the axis readable.
pub fn hourly_label_count(span: chrono::Duration) -> usize {
    span.num_hours().clamp(2, 24) as usize
}

pub fn min_and_max<I, T>(mut s: I) -> Option<(T, T)>
where
    I: Iterator<Item = T>,
    T: std::cmp::PartialOrd + Copy,
{
    let first = s.next()?;
    let (mut min, mut max) = (first, first);
    for es in s {
        if es > max {
            max = es
        } else if es < min {
            min = es
        }
    }
    Some((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    // run tests with:
    // cargo test -- --nocapture
    // to allow println! to stdout

    fn testdir(name: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("esp_temphum_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn two_sample_series() -> TimeSeries {
        let mut ts = TimeSeries::new(2);
        ts.samples.push(Sample {
            timestamp: NaiveDate::from_ymd_opt(2025, 8, 25)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            temp: vec![1.0, 2.0],
            humidity: vec![50.0, 55.0],
        });
        ts.samples.push(Sample {
            timestamp: NaiveDate::from_ymd_opt(2025, 8, 25)
                .unwrap()
                .and_hms_opt(10, 1, 0)
                .unwrap(),
            temp: vec![1.5, 2.5],
            humidity: vec![51.0, 56.0],
        });
        ts
    }

    #[test]
    fn save_then_load_round_trips() {
        let ts = two_sample_series();
        let fout = testdir("roundtrip").join("series.json");
        ts.to_json(&fout).unwrap();
        let reloaded = TimeSeries::from_json(&fout).unwrap();
        assert_eq!(ts, reloaded);
    }

    #[test]
    fn persisted_document_is_a_json_array() {
        let ts = two_sample_series();
        let fout = testdir("document").join("series.json");
        ts.to_json(&fout).unwrap();
        let text = std::fs::read_to_string(&fout).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        let arr = doc.as_array().unwrap();
        assert_eq!(arr.len(), 2);
        assert_eq!(arr[0]["timestamp"], "2025-08-25 10:00:00");
        assert_eq!(arr[1]["temp"][1], 2.5);
    }

    #[test]
    fn load_missing_file_reports_not_found() {
        let missing = testdir("missing").join("nope.json");
        match TimeSeries::from_json(&missing) {
            Err(StoreError::NotFound(p)) => assert_eq!(p, missing),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn load_malformed_document_reports_decode() {
        let fout = testdir("malformed").join("bad.json");
        std::fs::write(&fout, "this is not json").unwrap();
        match TimeSeries::from_json(&fout) {
            Err(StoreError::Decode(_)) => {}
            other => panic!("expected Decode, got {:?}", other),
        }
    }

    #[test]
    fn empty_series_plots_nothing() {
        let dir = testdir("plot_empty");
        let ts = TimeSeries::new(0);
        let paths = ts.plot_charts(&dir).unwrap();
        assert!(paths.is_empty());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn two_sample_series_plots_both_charts() {
        let dir = testdir("plot_two");
        let ts = two_sample_series();
        let paths = ts.plot_charts(&dir).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("temp_plots_20250825_100000.svg"));
        assert!(paths[1].ends_with("humidity_plots_20250825_100000.svg"));
        for p in paths.iter() {
            assert!(p.exists(), "missing chart {:?}", p);
        }
    }

    #[test]
    fn file_names_embed_the_first_timestamp() {
        let ts = two_sample_series();
        assert_eq!(ts.file_stamp().unwrap(), "20250825_100000");
        assert_eq!(
            ts.data_filename().unwrap(),
            "20250825_100000_collected_data.json"
        );
        assert!(TimeSeries::new(0).data_filename().is_none());
    }

    #[test]
    fn sensor_count_from_first_sample() {
        assert_eq!(two_sample_series().sensor_count(), 2);
        assert_eq!(TimeSeries::new(0).sensor_count(), 0);
    }

    #[test]
    fn label_count_clamps_to_readable_axis() {
        assert_eq!(hourly_label_count(chrono::Duration::minutes(2)), 2);
        assert_eq!(hourly_label_count(chrono::Duration::hours(6)), 6);
        assert_eq!(hourly_label_count(chrono::Duration::days(10)), 24);
    }

    #[test]
    fn min_and_max_on_unordered_timestamps() {
        let v = [3.0f64, 1.0, 2.0];
        assert_eq!(min_and_max(v.iter().copied()), Some((1.0, 3.0)));
        assert_eq!(min_and_max(std::iter::empty::<f64>()), None);
    }
}
