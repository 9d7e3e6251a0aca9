//! Bar loading per session date with resolution fallback.
//!
//! Bars are fetched once per distinct session date before any evaluation.
//! The fallback policy for `Resolution::Auto`:
//! 1. Try second bars for the session
//! 2. If none came back (or the fetch failed), try minute bars and record the
//!    session as a fallback
//! 3. If still nothing, record the session as missing; setups on that date
//!    are skipped by the caller
//!
//! Fetch errors never abort a run. They are logged and treated as missing
//! data.

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use setuplab_core::{PriceBar, SetupCandidate};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from a bar source.
#[derive(Debug, Error)]
pub enum BarSourceError {
    #[error("failed to read bar file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed bar file '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("bar source unavailable: {0}")]
    Unavailable(String),
}

/// Granularity of a bar series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarResolution {
    Second,
    Minute,
}

impl BarResolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
        }
    }
}

/// Requested resolution policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    #[default]
    Auto,
    Second,
    Minute,
}

/// Which resolution the loaded data actually came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionUsed {
    Second,
    Minute,
    #[default]
    None,
}

/// Something that returns the bars of one trading session.
///
/// An empty vector means "no data for this session" and is not an error.
pub trait BarSource: Send + Sync {
    fn name(&self) -> &str;

    fn fetch(
        &self,
        session_date: NaiveDate,
        resolution: BarResolution,
    ) -> Result<Vec<PriceBar>, BarSourceError>;
}

// ─── In-memory source ───────────────────────────────────────────────

/// Bars held in memory, keyed by session and resolution.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBarSource {
    sessions: HashMap<(NaiveDate, BarResolution), Vec<PriceBar>>,
}

impl InMemoryBarSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, session_date: NaiveDate, resolution: BarResolution, bars: Vec<PriceBar>) {
        self.sessions.insert((session_date, resolution), bars);
    }

    pub fn with_session(
        mut self,
        session_date: NaiveDate,
        resolution: BarResolution,
        bars: Vec<PriceBar>,
    ) -> Self {
        self.insert(session_date, resolution, bars);
        self
    }
}

impl BarSource for InMemoryBarSource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(
        &self,
        session_date: NaiveDate,
        resolution: BarResolution,
    ) -> Result<Vec<PriceBar>, BarSourceError> {
        Ok(self
            .sessions
            .get(&(session_date, resolution))
            .cloned()
            .unwrap_or_default())
    }
}

// ─── CSV directory source ───────────────────────────────────────────

/// CSV files laid out as `<root>/<resolution>/<YYYY-MM-DD>.csv`.
///
/// Each file has a header row with `timestamp,open,high,low,close` and an
/// optional `volume` column; `timestamp` is milliseconds since the epoch.
#[derive(Debug, Clone)]
pub struct CsvBarSource {
    root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CsvBarRecord {
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

impl CsvBarSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn session_path(&self, session_date: NaiveDate, resolution: BarResolution) -> PathBuf {
        self.root
            .join(resolution.as_str())
            .join(format!("{}.csv", session_date.format("%Y-%m-%d")))
    }

    fn read_file(path: &Path) -> Result<Vec<PriceBar>, BarSourceError> {
        let mut reader = csv::Reader::from_path(path).map_err(|source| BarSourceError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        reader
            .deserialize::<CsvBarRecord>()
            .map(|record| {
                let record = record.map_err(|source| BarSourceError::Csv {
                    path: path.to_path_buf(),
                    source,
                })?;
                Ok(PriceBar {
                    timestamp: record.timestamp,
                    open: record.open,
                    high: record.high,
                    low: record.low,
                    close: record.close,
                    volume: record.volume.unwrap_or(0.0),
                })
            })
            .collect()
    }
}

impl BarSource for CsvBarSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch(
        &self,
        session_date: NaiveDate,
        resolution: BarResolution,
    ) -> Result<Vec<PriceBar>, BarSourceError> {
        let path = self.session_path(session_date, resolution);
        match std::fs::metadata(&path) {
            Ok(_) => Self::read_file(&path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(BarSourceError::Io { path, source }),
        }
    }
}

// ─── Session loading ────────────────────────────────────────────────

/// Bars for every requested session plus provenance.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionBars {
    pub bars: BTreeMap<NaiveDate, Vec<PriceBar>>,
    pub requested: Resolution,
    pub resolution_used: ResolutionUsed,
    pub missing_sessions: Vec<NaiveDate>,
    pub fallback_sessions: Vec<NaiveDate>,
    pub second_sessions: usize,
    pub minute_sessions: usize,
}

impl SessionBars {
    /// Bars for a session; empty when the session is missing.
    pub fn session(&self, session_date: NaiveDate) -> &[PriceBar] {
        self.bars
            .get(&session_date)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_session(&self, session_date: NaiveDate) -> bool {
        !self.session(session_date).is_empty()
    }

    /// BLAKE3 over every loaded bar, in session order.
    pub fn dataset_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (date, bars) in &self.bars {
            hasher.update(date.to_string().as_bytes());
            for bar in bars {
                hasher.update(&bar.timestamp.to_le_bytes());
                hasher.update(&bar.open.to_le_bytes());
                hasher.update(&bar.high.to_le_bytes());
                hasher.update(&bar.low.to_le_bytes());
                hasher.update(&bar.close.to_le_bytes());
                hasher.update(&bar.volume.to_le_bytes());
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    /// BLAKE3 over the evaluated setups and the bars they were evaluated on.
    pub fn fingerprint_with(&self, setups: &[SetupCandidate]) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.dataset_hash().as_bytes());
        for setup in setups {
            let json = serde_json::to_string(setup).unwrap_or_default();
            hasher.update(json.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

struct SessionLoad {
    date: NaiveDate,
    bars: Vec<PriceBar>,
    resolution: Option<BarResolution>,
}

fn fetch_or_warn(
    source: &dyn BarSource,
    date: NaiveDate,
    resolution: BarResolution,
) -> Vec<PriceBar> {
    match source.fetch(date, resolution) {
        Ok(bars) => clean(bars),
        Err(e) => {
            warn!(
                source = source.name(),
                session = %date,
                resolution = resolution.as_str(),
                error = %e,
                "bar fetch failed; treating session as missing"
            );
            Vec::new()
        }
    }
}

/// Drop void bars and sort ascending by timestamp.
fn clean(mut bars: Vec<PriceBar>) -> Vec<PriceBar> {
    bars.retain(|bar| !bar.is_void());
    bars.sort_by_key(|bar| bar.timestamp);
    bars
}

fn load_one(source: &dyn BarSource, date: NaiveDate, requested: Resolution) -> SessionLoad {
    if matches!(requested, Resolution::Auto | Resolution::Second) {
        let bars = fetch_or_warn(source, date, BarResolution::Second);
        if !bars.is_empty() {
            return SessionLoad { date, bars, resolution: Some(BarResolution::Second) };
        }
    }
    if matches!(requested, Resolution::Auto | Resolution::Minute) {
        let bars = fetch_or_warn(source, date, BarResolution::Minute);
        if !bars.is_empty() {
            return SessionLoad { date, bars, resolution: Some(BarResolution::Minute) };
        }
    }
    SessionLoad { date, bars: Vec::new(), resolution: None }
}

/// Load bars once per distinct session date.
///
/// With `max_concurrent_fetches` above 1 the fetches run on a dedicated
/// rayon pool of that size; otherwise they run one after another.
pub fn load_sessions<I>(
    source: &dyn BarSource,
    session_dates: I,
    requested: Resolution,
    max_concurrent_fetches: usize,
) -> SessionBars
where
    I: IntoIterator<Item = NaiveDate>,
{
    let dates: Vec<NaiveDate> = session_dates
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let sequential = |dates: &[NaiveDate]| -> Vec<SessionLoad> {
        dates.iter().map(|&d| load_one(source, d, requested)).collect()
    };

    let loads: Vec<SessionLoad> = if max_concurrent_fetches > 1 && dates.len() > 1 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(max_concurrent_fetches)
            .build()
        {
            Ok(pool) => pool.install(|| {
                dates
                    .par_iter()
                    .map(|&d| load_one(source, d, requested))
                    .collect()
            }),
            Err(e) => {
                warn!(error = %e, "could not build fetch pool; loading sessions sequentially");
                sequential(&dates)
            }
        }
    } else {
        sequential(&dates)
    };

    let mut out = SessionBars { requested, ..Default::default() };
    for load in loads {
        match load.resolution {
            Some(BarResolution::Second) => out.second_sessions += 1,
            Some(BarResolution::Minute) => {
                out.minute_sessions += 1;
                if requested == Resolution::Auto {
                    out.fallback_sessions.push(load.date);
                }
            }
            None => {
                warn!(session = %load.date, "no bars for session");
                out.missing_sessions.push(load.date);
            }
        }
        debug!(session = %load.date, bars = load.bars.len(), "session loaded");
        out.bars.insert(load.date, load.bars);
    }

    out.resolution_used = if out.second_sessions > 0 {
        ResolutionUsed::Second
    } else if out.minute_sessions > 0 {
        ResolutionUsed::Minute
    } else {
        ResolutionUsed::None
    };
    out
}
