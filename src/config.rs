use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::engine::{validate_policy, windows_on, AddonFees, EngineError, Rate, RateTable};
use crate::limits::*;
use crate::model::*;
use crate::ports::{CourtDirectory, RateSource, ScheduleSource};

// ── Runtime settings ────────────────────────────────────────────

/// Process-wide settings read from `COURTBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// WAL appends between compactions.
    pub compact_threshold: u64,
    pub store_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset or unparsable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("COURTBOOK_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            metrics_port: lookup("COURTBOOK_METRICS_PORT").and_then(|s| s.parse().ok()),
            compact_threshold: lookup("COURTBOOK_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            store_timeout: lookup("COURTBOOK_STORE_TIMEOUT_MS")
                .and_then(|s| s.parse().ok())
                .map_or(defaults.store_timeout, Duration::from_millis),
        }
    }
}

// ── Facility definition ─────────────────────────────────────────

fn default_granularity() -> Minutes {
    DEFAULT_GRANULARITY_MINUTES
}

/// On-disk facility description, `<data_dir>/<tenant>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityConfig {
    pub name: String,
    #[serde(default = "default_granularity")]
    pub granularity_minutes: Minutes,
    /// Offered booking lengths, in the order they are presented.
    pub durations: Vec<u32>,
    #[serde(default)]
    pub addon_fees: AddonFees,
    pub courts: Vec<CourtConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourtConfig {
    #[serde(flatten)]
    pub court: Court,
    #[serde(default)]
    pub rates: RateTable,
}

/// A validated facility: the court directory, schedule source and rate
/// source for one tenant.
#[derive(Debug, Clone)]
pub struct Facility {
    pub name: String,
    pub policy: BookingPolicy,
    pub fees: AddonFees,
    order: Vec<CourtId>,
    courts: HashMap<CourtId, Court>,
    rates: HashMap<CourtId, RateTable>,
}

impl Facility {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::InvalidConfig(format!("{}: {e}", path.display())))?;
        let config: FacilityConfig = serde_json::from_str(&raw)
            .map_err(|e| EngineError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_config(config)
    }

    pub fn from_config(config: FacilityConfig) -> Result<Self, EngineError> {
        if config.name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("facility name too long"));
        }
        if config.courts.len() > MAX_COURTS_PER_FACILITY {
            return Err(EngineError::LimitExceeded("too many courts"));
        }
        let policy = BookingPolicy {
            granularity: config.granularity_minutes,
            durations: config.durations,
        };
        validate_policy(&policy)?;

        let mut seen = HashSet::new();
        let mut order = Vec::with_capacity(config.courts.len());
        let mut courts = HashMap::with_capacity(config.courts.len());
        let mut rates = HashMap::with_capacity(config.courts.len());
        for CourtConfig { court, rates: table } in config.courts {
            validate_court(&court, &table)?;
            if !seen.insert(court.id) {
                return Err(EngineError::InvalidConfig(format!("duplicate court id {}", court.id)));
            }
            order.push(court.id);
            rates.insert(court.id, table);
            courts.insert(court.id, court);
        }

        Ok(Self {
            name: config.name,
            policy,
            fees: config.addon_fees,
            order,
            courts,
            rates,
        })
    }

    pub fn courts(&self) -> impl Iterator<Item = &Court> {
        self.order.iter().filter_map(|id| self.courts.get(id))
    }
}

fn validate_court(court: &Court, rates: &RateTable) -> Result<(), EngineError> {
    if court.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("court name too long"));
    }
    if court.windows.len() > MAX_WINDOWS_PER_COURT {
        return Err(EngineError::LimitExceeded("too many windows"));
    }
    if rates.brackets.len() + rates.promotions.len() > MAX_RATE_ENTRIES_PER_COURT {
        return Err(EngineError::LimitExceeded("too many rate entries"));
    }
    if court.max_players == 0 {
        return Err(EngineError::InvalidConfig(format!("court {} has no players", court.name)));
    }
    for w in &court.windows {
        let closes_at_midnight = w.end == chrono::NaiveTime::MIN;
        if !closes_at_midnight && w.end <= w.start {
            return Err(EngineError::InvalidConfig(format!(
                "court {}: window {}-{} ends before it starts",
                court.name, w.start, w.end
            )));
        }
    }
    for (i, a) in court.windows.iter().enumerate() {
        for b in &court.windows[i + 1..] {
            let (a_start, a_end) = rule_seconds(a);
            let (b_start, b_end) = rule_seconds(b);
            if a.on == b.on && a_start < b_end && b_start < a_end {
                return Err(EngineError::InvalidConfig(format!(
                    "court {}: windows {}-{} and {}-{} overlap",
                    court.name, a.start, a.end, b.start, b.end
                )));
            }
        }
    }
    let negative = rates.brackets.iter().any(|b| b.per_hour < 0) || rates.promotions.iter().any(|p| p.per_hour < 0);
    if negative {
        return Err(EngineError::InvalidConfig(format!("court {}: negative rate", court.name)));
    }
    Ok(())
}

/// Seconds from midnight covered by a rule, a `00:00` end read as 24:00.
fn rule_seconds(w: &WindowRule) -> (u32, u32) {
    let end = match w.end.num_seconds_from_midnight() {
        0 => 24 * 3600,
        s => s,
    };
    (w.start.num_seconds_from_midnight(), end)
}

impl CourtDirectory for Facility {
    fn court(&self, court_id: CourtId) -> Option<Court> {
        self.courts.get(&court_id).cloned()
    }

    fn court_ids(&self) -> Vec<CourtId> {
        self.order.clone()
    }
}

impl ScheduleSource for Facility {
    fn operating_windows(&self, court_id: CourtId, date: NaiveDate) -> Result<Vec<Span>, EngineError> {
        let court = self.courts.get(&court_id).ok_or(EngineError::NotFound(court_id))?;
        Ok(windows_on(court, date))
    }
}

impl RateSource for Facility {
    fn rate(&self, court_id: CourtId, at: NaiveDateTime) -> Result<Option<Rate>, EngineError> {
        let table = self.rates.get(&court_id).ok_or(EngineError::NotFound(court_id))?;
        Ok(table.rate_at(at))
    }
}
