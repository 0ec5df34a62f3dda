//! Guard configuration
//!
//! Read-only after construction: the engine holds an `Arc<GuardConfig>` and
//! replaces it wholesale on reconfiguration. Loadable from TOML; missing keys
//! fall back to the defaults below.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::{Direction, GuardError, SignalCategory, ALERT_HIGH, ALERT_LOW, DEFAULT_REPUTATION, PHI};

/// Complete guard configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Text beyond this many characters is truncated before scoring
    pub max_text_len: usize,
    pub decay: DecayParams,
    pub thresholds: Thresholds,
    pub weights: CategoryWeights,
    pub rate_limit: RateLimitParams,
    pub dedup: DedupParams,
    pub power: PowerParams,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_text_len: 1024,
            decay: DecayParams::default(),
            thresholds: Thresholds::default(),
            weights: CategoryWeights::default(),
            rate_limit: RateLimitParams::default(),
            dedup: DedupParams::default(),
            power: PowerParams::default(),
        }
    }
}

/// Memory model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayParams {
    pub phi: f64,
    /// Silence longer than this triggers forgetting
    pub idle_threshold_secs: f64,
    pub initial_reputation: f64,
    /// Reputation drifts here during long silences
    pub reputation_midpoint: f64,
}

impl DecayParams {
    /// 1 / (6·phi)
    pub fn gamma(&self) -> f64 {
        1.0 / (6.0 * self.phi)
    }
}

impl Default for DecayParams {
    fn default() -> Self {
        Self {
            phi: PHI,
            idle_threshold_secs: 3600.0,
            initial_reputation: DEFAULT_REPUTATION,
            reputation_midpoint: DEFAULT_REPUTATION,
        }
    }
}

/// Decision thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub alert_low: f64,
    pub alert_high: f64,
    /// Applied to `alert_high` for outbound traffic; must be in (0, 1]
    pub outbound_multiplier: f64,
    /// Category scores below this do not count as triggered
    pub trigger_floor: f64,
    /// Reputation at or below this escalates ALLOW to FLAG
    pub reputation_floor: f64,
}

impl Thresholds {
    /// Risk at which a message from this direction is blocked
    pub fn block_threshold(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Inbound => self.alert_high,
            Direction::Outbound => self.alert_high * self.outbound_multiplier,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            alert_low: ALERT_LOW,
            alert_high: ALERT_HIGH,
            outbound_multiplier: 0.8,
            trigger_floor: 0.2,
            reputation_floor: 0.2,
        }
    }
}

/// Category weights for the aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryWeights {
    pub spam: f64,
    pub scam: f64,
    pub urgency_abuse: f64,
    pub impersonation: f64,
    /// Multiplier on co-occurring categories
    pub overlap_bonus: f64,
}

impl CategoryWeights {
    pub fn weight(&self, category: SignalCategory) -> f64 {
        match category {
            SignalCategory::Spam => self.spam,
            SignalCategory::Scam => self.scam,
            SignalCategory::UrgencyAbuse => self.urgency_abuse,
            SignalCategory::Impersonation => self.impersonation,
        }
    }
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            spam: 0.7,
            scam: 1.0,
            urgency_abuse: 0.85,
            impersonation: 0.95,
            overlap_bonus: 0.35,
        }
    }
}

/// Token bucket parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitParams {
    pub enabled: bool,
    /// Bucket capacity in messages
    pub capacity: f64,
    /// Tokens restored per second
    pub refill_per_sec: f64,
}

impl Default for RateLimitParams {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 5.0,
            refill_per_sec: 20.0 / 60.0,
        }
    }
}

/// Deduplication window parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupParams {
    pub enabled: bool,
    pub window_secs: f64,
    /// Fingerprints kept per sender
    pub capacity: usize,
}

impl Default for DedupParams {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 300.0,
            capacity: 50,
        }
    }
}

/// Device power modes, from mains power down to a failing battery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerMode {
    Full,
    #[default]
    Balanced,
    LowPower,
    UltraLow,
}

/// Stages a power mode keeps running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerProfile {
    pub mode: PowerMode,
    /// Envelopes the bridge takes off its intake per pass
    pub batch_size: usize,
    /// Track reputation and apply the low-reputation stage
    pub reputation: bool,
    /// Keep per-sender fingerprints
    pub dedup: bool,
    /// Score every message with the full tables. When off, only messages
    /// whose quick check exceeds `power.quick_check_floor` are scored.
    pub full_analysis: bool,
}

impl PowerMode {
    pub const ALL: [PowerMode; 4] = [
        PowerMode::Full,
        PowerMode::Balanced,
        PowerMode::LowPower,
        PowerMode::UltraLow,
    ];

    pub fn profile(&self) -> PowerProfile {
        let (batch_size, reputation, dedup, full_analysis) = match self {
            PowerMode::Full => (50, true, true, true),
            PowerMode::Balanced => (20, true, true, true),
            PowerMode::LowPower => (10, false, true, false),
            PowerMode::UltraLow => (5, false, false, false),
        };
        PowerProfile {
            mode: *self,
            batch_size,
            reputation,
            dedup,
            full_analysis,
        }
    }

    /// Mode for a battery level in [0, 1]
    pub fn for_battery(level: f64, charging: bool) -> Self {
        if charging {
            PowerMode::Full
        } else if level > 0.7 {
            PowerMode::Balanced
        } else if level > 0.3 {
            PowerMode::LowPower
        } else {
            PowerMode::UltraLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PowerMode::Full => "full",
            PowerMode::Balanced => "balanced",
            PowerMode::LowPower => "low_power",
            PowerMode::UltraLow => "ultra_low",
        }
    }
}

impl fmt::Display for PowerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerMode {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "full" => Ok(PowerMode::Full),
            "balanced" => Ok(PowerMode::Balanced),
            "low_power" | "low" => Ok(PowerMode::LowPower),
            "ultra_low" | "ultra" => Ok(PowerMode::UltraLow),
            other => Err(invalid(&format!("unknown power mode '{}'", other))),
        }
    }
}

/// Power settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerParams {
    pub mode: PowerMode,
    /// Quick-check score a message must exceed to get full analysis in
    /// modes without `full_analysis`
    pub quick_check_floor: f64,
}

impl Default for PowerParams {
    fn default() -> Self {
        Self {
            mode: PowerMode::default(),
            quick_check_floor: 0.2,
        }
    }
}

impl GuardConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(content: &str) -> Result<Self, GuardError> {
        let config: GuardConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, GuardError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GuardError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Memory rate derived from phi
    pub fn gamma(&self) -> f64 {
        self.decay.gamma()
    }

    pub fn profile(&self) -> PowerProfile {
        self.power.mode.profile()
    }

    /// Dedup runs only when configured and kept by the power mode
    pub fn dedup_active(&self) -> bool {
        self.dedup.enabled && self.profile().dedup
    }

    /// Check every range constraint
    pub fn validate(&self) -> Result<(), GuardError> {
        let d = &self.decay;
        if !(d.phi.is_finite() && d.phi > 0.0) {
            return Err(invalid("decay.phi must be positive"));
        }
        if !(d.idle_threshold_secs.is_finite() && d.idle_threshold_secs > 0.0) {
            return Err(invalid("decay.idle_threshold_secs must be positive"));
        }
        unit("decay.initial_reputation", d.initial_reputation)?;
        unit("decay.reputation_midpoint", d.reputation_midpoint)?;

        let t = &self.thresholds;
        open_unit("thresholds.alert_low", t.alert_low)?;
        open_unit("thresholds.alert_high", t.alert_high)?;
        if t.alert_low > t.alert_high {
            return Err(invalid(&format!(
                "thresholds.alert_low ({}) exceeds thresholds.alert_high ({})",
                t.alert_low, t.alert_high
            )));
        }
        if !(t.outbound_multiplier > 0.0 && t.outbound_multiplier <= 1.0) {
            return Err(invalid("thresholds.outbound_multiplier must be in (0, 1]"));
        }
        unit("thresholds.trigger_floor", t.trigger_floor)?;
        unit("thresholds.reputation_floor", t.reputation_floor)?;

        let w = &self.weights;
        for category in SignalCategory::ALL {
            unit(&format!("weights.{}", category), w.weight(category))?;
        }
        unit("weights.overlap_bonus", w.overlap_bonus)?;

        let r = &self.rate_limit;
        if !(r.capacity.is_finite() && r.capacity >= 1.0) {
            return Err(invalid("rate_limit.capacity must be at least 1"));
        }
        if !(r.refill_per_sec.is_finite() && r.refill_per_sec >= 0.0) {
            return Err(invalid("rate_limit.refill_per_sec must be non-negative"));
        }

        let dd = &self.dedup;
        if !(dd.window_secs.is_finite() && dd.window_secs > 0.0) {
            return Err(invalid("dedup.window_secs must be positive"));
        }
        if dd.capacity == 0 {
            return Err(invalid("dedup.capacity must be at least 1"));
        }

        unit("power.quick_check_floor", self.power.quick_check_floor)?;

        if self.max_text_len == 0 {
            return Err(invalid("max_text_len must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> GuardError {
    GuardError::Configuration(msg.to_string())
}

fn unit(name: &str, value: f64) -> Result<(), GuardError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(&format!("{} must be in [0, 1], got {}", name, value)))
    }
}

fn open_unit(name: &str, value: f64) -> Result<(), GuardError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(invalid(&format!("{} must be in (0, 1), got {}", name, value)))
    }
}
