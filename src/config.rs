//! Pipeline configuration.
//!
//! [`PipelineConfig`] holds every tunable parameter for a run: the channel
//! role mapping, the per-role filter constants, and the analyzer reference
//! rate. It is constructed once per dialect/site before any recording is
//! processed and passed by shared reference into every stage — stages never
//! mutate it.

use serde::Serialize;

/// Logical role a channel plays for the downstream RBD analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChannelRole {
    /// Submental (chin) EMG.
    ChinEmg,
    /// Left anterior tibialis / left leg EMG.
    LeftLegEmg,
    /// Right anterior tibialis / right leg EMG.
    RightLegEmg,
}

impl ChannelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelRole::ChinEmg => "chin",
            ChannelRole::LeftLegEmg => "left-leg",
            ChannelRole::RightLegEmg => "right-leg",
        }
    }
}

/// Immutable binding of channel-label patterns to [`ChannelRole`]s.
///
/// Matching is case-insensitive substring search, in declaration order, so a
/// site whose montage labels legs `"EMG LAT"` / `"EMG RAT"` and chin
/// `"EMG Chin"` resolves with the default table. Build one per dialect/site
/// with [`RoleMap::default`] or extend it with [`RoleMap::with_pattern`].
#[derive(Debug, Clone)]
pub struct RoleMap {
    patterns: Vec<(String, ChannelRole)>,
}

impl Default for RoleMap {
    /// Patterns observed across the supported montages: `CHIN` for the
    /// submental channel, `LLEG`/`LAT` and `RLEG`/`RAT` for the legs.
    fn default() -> Self {
        let patterns = [
            ("CHIN", ChannelRole::ChinEmg),
            ("LLEG", ChannelRole::LeftLegEmg),
            ("LAT", ChannelRole::LeftLegEmg),
            ("RLEG", ChannelRole::RightLegEmg),
            ("RAT", ChannelRole::RightLegEmg),
        ]
        .into_iter()
        .map(|(p, r)| (p.to_string(), r))
        .collect();
        Self { patterns }
    }
}

impl RoleMap {
    /// Add a site-specific label pattern. Patterns added later lose to
    /// earlier ones when both match.
    pub fn with_pattern(mut self, pattern: &str, role: ChannelRole) -> Self {
        self.patterns.push((pattern.to_uppercase(), role));
        self
    }

    /// Resolve a channel label to its role, `None` when no pattern matches.
    pub fn resolve(&self, label: &str) -> Option<ChannelRole> {
        let upper = label.to_uppercase();
        self.patterns
            .iter()
            .find(|(p, _)| upper.contains(p.as_str()))
            .map(|(_, r)| *r)
    }

    /// True when the label matches any EMG role pattern.
    pub fn is_emg(&self, label: &str) -> bool {
        self.resolve(label).is_some()
    }
}

/// Fixed digital-filter constants for one channel role.
///
/// These are design constants derived from signal analysis of the reference
/// deployment, not fitted to data at run time.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FilterSpec {
    /// High-pass cutoff (Hz).
    pub highpass_hz: f64,
    /// Low-pass cutoff (Hz); clamped to 95% of Nyquist at application time
    /// when the channel's rate is too low for it.
    pub lowpass_hz: f64,
    /// Power-line notch center (Hz).
    pub notch_hz: f64,
    /// Notch quality factor (higher = narrower).
    pub notch_q: f64,
    /// Butterworth order of the band-pass stage.
    pub order: usize,
}

impl FilterSpec {
    /// Chin EMG: 10–100 Hz band-pass, 60 Hz notch (Q=30), 4th order.
    pub fn chin() -> Self {
        Self {
            highpass_hz: 10.0,
            lowpass_hz: 100.0,
            notch_hz: 60.0,
            notch_q: 30.0,
            order: 4,
        }
    }

    /// Leg EMG: 15–100 Hz band-pass. Leg channels carry heavier DC/drift
    /// contamination, hence the higher high-pass cutoff.
    pub fn leg() -> Self {
        Self {
            highpass_hz: 15.0,
            ..Self::chin()
        }
    }

    /// Filter constants for a role.
    pub fn for_role(role: ChannelRole) -> Self {
        match role {
            ChannelRole::ChinEmg => Self::chin(),
            ChannelRole::LeftLegEmg | ChannelRole::RightLegEmg => Self::leg(),
        }
    }
}

/// Configuration for the full conditioning pipeline.
///
/// All fields are `pub`, so a site can adjust single values with
/// struct-update syntax:
///
/// ```
/// use psgprep::PipelineConfig;
///
/// let cfg = PipelineConfig {
///     line_freq_hz: 50.0,   // European deployment
///     ..PipelineConfig::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Channel-label → role table for this dialect/site.
    pub roles: RoleMap,

    /// Local power-line frequency (Hz). Substituted for the per-role
    /// [`FilterSpec::notch_hz`] default when it differs.
    ///
    /// Default: `60.0` (reference deployment).
    pub line_freq_hz: f64,

    /// Sample rate (Hz) the downstream analysis tool expects. Channels whose
    /// rate differs are resampled — never truncated — before hand-off.
    ///
    /// Default: `256.0`.
    pub analyzer_sfreq: f64,

    /// Minimum physical range (µV) enforced for EMG-role channels during
    /// reconstruction, so that phasic bursts can never clip.
    ///
    /// Default: `500.0`.
    pub emg_range_floor_uv: f64,

    /// Epoch length (s) of sleep-stage scoring; used to bound stage
    /// intervals when deriving per-sample presence.
    ///
    /// Default: `30.0`.
    pub stage_epoch_secs: f64,

    /// Reconstruct even self-describing continuous containers, re-deriving
    /// their physical ranges from the data. For files whose declared ranges
    /// contradict the observed extrema (earlier conversions clipped them).
    ///
    /// Default: `false`.
    pub force_reconstruct: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            roles: RoleMap::default(),
            line_freq_hz: 60.0,
            analyzer_sfreq: 256.0,
            emg_range_floor_uv: 500.0,
            stage_epoch_secs: 30.0,
            force_reconstruct: false,
        }
    }
}

impl PipelineConfig {
    /// Filter constants for `role`, with the configured line frequency
    /// substituted into the notch stage.
    pub fn filter_spec(&self, role: ChannelRole) -> FilterSpec {
        FilterSpec {
            notch_hz: self.line_freq_hz,
            ..FilterSpec::for_role(role)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rolemap_resolves_reference_montage() {
        let map = RoleMap::default();
        assert_eq!(map.resolve("EMG CHIN"), Some(ChannelRole::ChinEmg));
        assert_eq!(map.resolve("LLeg"), Some(ChannelRole::LeftLegEmg));
        assert_eq!(map.resolve("EMG Rat"), Some(ChannelRole::RightLegEmg));
        assert_eq!(map.resolve("EEG C3-A2"), None);
    }

    #[test]
    fn site_pattern_extension() {
        let map = RoleMap::default().with_pattern("TIB-L", ChannelRole::LeftLegEmg);
        assert_eq!(map.resolve("Tib-L"), Some(ChannelRole::LeftLegEmg));
    }

    #[test]
    fn leg_spec_has_higher_highpass() {
        assert!(FilterSpec::leg().highpass_hz > FilterSpec::chin().highpass_hz);
        assert_eq!(FilterSpec::leg().lowpass_hz, 100.0);
    }

    #[test]
    fn line_freq_substitution() {
        let cfg = PipelineConfig {
            line_freq_hz: 50.0,
            ..PipelineConfig::default()
        };
        assert_eq!(cfg.filter_spec(ChannelRole::ChinEmg).notch_hz, 50.0);
    }
}
