use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// Weighted means of clamped percentages can land a hair outside [0, 100].
const PERCENT_TOLERANCE: f64 = 1e-9;

/// NAAC letter grade, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GradeBand {
    APlusPlus,
    APlus,
    A,
    BPlusPlus,
    BPlus,
    B,
    C,
    D,
}

impl GradeBand {
    pub const ALL: [GradeBand; 8] = [
        GradeBand::APlusPlus,
        GradeBand::APlus,
        GradeBand::A,
        GradeBand::BPlusPlus,
        GradeBand::BPlus,
        GradeBand::B,
        GradeBand::C,
        GradeBand::D,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            GradeBand::APlusPlus => "A++",
            GradeBand::APlus => "A+",
            GradeBand::A => "A",
            GradeBand::BPlusPlus => "B++",
            GradeBand::BPlus => "B+",
            GradeBand::B => "B",
            GradeBand::C => "C",
            GradeBand::D => "D",
        }
    }

    /// Higher is better; D is 0.
    pub const fn rank(self) -> u8 {
        match self {
            GradeBand::APlusPlus => 7,
            GradeBand::APlus => 6,
            GradeBand::A => 5,
            GradeBand::BPlusPlus => 4,
            GradeBand::BPlus => 3,
            GradeBand::B => 2,
            GradeBand::C => 1,
            GradeBand::D => 0,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = raw.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|band| band.label() == wanted)
    }

    /// Grade a dashboard aims for when an institution asks for `self`. D is never a target.
    pub fn as_target(self) -> Self {
        match self {
            GradeBand::D => GradeBand::C,
            other => other,
        }
    }
}

impl fmt::Display for GradeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for GradeBand {
    type Err = GradeScaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| GradeScaleError::UnknownBand(s.to_string()))
    }
}

impl Serialize for GradeBand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for GradeBand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        GradeBand::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown grade band '{raw}'")))
    }
}

/// Raised when a computed score breaks the 0-100 contract.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("score {0} is outside the 0-100 range")]
    PercentOutOfRange(f64),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GradeScaleError {
    #[error("grade scale has no bands")]
    Empty,
    #[error("grade scale entry '{0}' must look like <min_percent>:<band>")]
    Entry(String),
    #[error("unknown grade band '{0}'")]
    UnknownBand(String),
    #[error("grade threshold {0} must be within 0..=100")]
    OutOfRange(f64),
    #[error("grade thresholds must strictly descend ({upper} then {lower})")]
    NotDescending { upper: f64, lower: f64 },
    #[error("grade band {0} appears more than once")]
    DuplicateBand(&'static str),
    #[error("lowest grade threshold must be 0, found {0}")]
    MissingFloor(f64),
}

/// Ordered `(min_percent, band)` table scanned from the top band down.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeScale {
    bands: Vec<GradeThreshold>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GradeThreshold {
    pub min_percent: f64,
    pub band: GradeBand,
}

impl Default for GradeScale {
    fn default() -> Self {
        Self::naac_default()
    }
}

impl GradeScale {
    /// NAAC CGPA cut-offs (3.51, 3.26, 3.01, 2.76, 2.51, 2.01, 1.51) scaled from 4 points to 100.
    pub fn naac_default() -> Self {
        Self {
            bands: vec![
                GradeThreshold { min_percent: 87.75, band: GradeBand::APlusPlus },
                GradeThreshold { min_percent: 81.5, band: GradeBand::APlus },
                GradeThreshold { min_percent: 75.25, band: GradeBand::A },
                GradeThreshold { min_percent: 69.0, band: GradeBand::BPlusPlus },
                GradeThreshold { min_percent: 62.75, band: GradeBand::BPlus },
                GradeThreshold { min_percent: 50.25, band: GradeBand::B },
                GradeThreshold { min_percent: 37.75, band: GradeBand::C },
                GradeThreshold { min_percent: 0.0, band: GradeBand::D },
            ],
        }
    }

    pub fn new<I>(entries: I) -> Result<Self, GradeScaleError>
    where
        I: IntoIterator<Item = (f64, GradeBand)>,
    {
        let bands: Vec<GradeThreshold> = entries
            .into_iter()
            .map(|(min_percent, band)| GradeThreshold { min_percent, band })
            .collect();

        let Some(last) = bands.last() else {
            return Err(GradeScaleError::Empty);
        };

        for threshold in &bands {
            if !(0.0..=100.0).contains(&threshold.min_percent) {
                return Err(GradeScaleError::OutOfRange(threshold.min_percent));
            }
        }
        for pair in bands.windows(2) {
            if pair[0].min_percent <= pair[1].min_percent {
                return Err(GradeScaleError::NotDescending {
                    upper: pair[0].min_percent,
                    lower: pair[1].min_percent,
                });
            }
        }
        for (index, threshold) in bands.iter().enumerate() {
            if bands[..index].iter().any(|seen| seen.band == threshold.band) {
                return Err(GradeScaleError::DuplicateBand(threshold.band.label()));
            }
        }
        if last.min_percent != 0.0 {
            return Err(GradeScaleError::MissingFloor(last.min_percent));
        }

        Ok(Self { bands })
    }

    /// Parse `90:A++,75:A+,60:A,0:D`.
    pub fn parse(raw: &str) -> Result<Self, GradeScaleError> {
        let entries = raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (threshold, band) = entry
                    .split_once(':')
                    .ok_or_else(|| GradeScaleError::Entry(entry.to_string()))?;
                let threshold = threshold
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| GradeScaleError::Entry(entry.to_string()))?;
                let band = band.parse::<GradeBand>()?;
                Ok((threshold, band))
            })
            .collect::<Result<Vec<_>, GradeScaleError>>()?;

        Self::new(entries)
    }

    pub fn thresholds(&self) -> &[GradeThreshold] {
        &self.bands
    }

    pub fn grade_for(&self, percent: f64) -> Result<GradeBand, InvariantViolation> {
        if !percent.is_finite()
            || percent < -PERCENT_TOLERANCE
            || percent > 100.0 + PERCENT_TOLERANCE
        {
            return Err(InvariantViolation::PercentOutOfRange(percent));
        }
        let percent = percent.clamp(0.0, 100.0);

        self.bands
            .iter()
            .find(|threshold| percent >= threshold.min_percent)
            .map(|threshold| threshold.band)
            .ok_or(InvariantViolation::PercentOutOfRange(percent))
    }

    pub fn lower_bound(&self, band: GradeBand) -> Option<f64> {
        self.bands
            .iter()
            .find(|threshold| threshold.band == band)
            .map(|threshold| threshold.min_percent)
    }

    /// Percentage an institution must reach for its desired grade.
    ///
    /// A desired D targets C. Bands missing from a custom scale resolve to the
    /// lowest listed band that is at least as good.
    pub fn target_percent(&self, desired: GradeBand) -> f64 {
        let desired = desired.as_target();
        if let Some(bound) = self.lower_bound(desired) {
            return bound;
        }
        self.bands
            .iter()
            .rev()
            .find(|threshold| threshold.band.rank() >= desired.rank())
            .or_else(|| self.bands.first())
            .map(|threshold| threshold.min_percent)
            .unwrap_or(100.0)
    }
}
