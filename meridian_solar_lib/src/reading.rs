//! The six-value energy reading and the outcome of one update cycle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the six published values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingField {
    CurrentRate,
    NextRate,
    SolarGeneration,
    DailyConsumption,
    DailyFeedIn,
    AverageDailyUse,
}

impl ReadingField {
    pub const ALL: [ReadingField; 6] = [
        ReadingField::CurrentRate,
        ReadingField::NextRate,
        ReadingField::SolarGeneration,
        ReadingField::DailyConsumption,
        ReadingField::DailyFeedIn,
        ReadingField::AverageDailyUse,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ReadingField::CurrentRate => "current_rate",
            ReadingField::NextRate => "next_rate",
            ReadingField::SolarGeneration => "solar_generation",
            ReadingField::DailyConsumption => "daily_consumption",
            ReadingField::DailyFeedIn => "daily_feed_in",
            ReadingField::AverageDailyUse => "average_daily_use",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReadingField::CurrentRate => "Current Rate",
            ReadingField::NextRate => "Next Rate",
            ReadingField::SolarGeneration => "Solar Generation",
            ReadingField::DailyConsumption => "Daily Consumption",
            ReadingField::DailyFeedIn => "Daily Feed-in",
            ReadingField::AverageDailyUse => "Average Daily Use",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            ReadingField::CurrentRate | ReadingField::NextRate => "$/kWh",
            _ => "kWh",
        }
    }
}

impl fmt::Display for ReadingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Rates are dollars per kWh, the rest kWh for the selected day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyReading {
    pub current_rate: f64,
    pub next_rate: f64,
    pub solar_generation: f64,
    pub daily_consumption: f64,
    pub daily_feed_in: f64,
    pub average_daily_use: f64,
}

impl EnergyReading {
    /// All energy values zero, both rates at `fallback_rate`.
    pub fn defaults(fallback_rate: f64) -> Self {
        Self {
            current_rate: fallback_rate,
            next_rate: fallback_rate,
            solar_generation: 0.0,
            daily_consumption: 0.0,
            daily_feed_in: 0.0,
            average_daily_use: 0.0,
        }
    }

    pub fn get(&self, field: ReadingField) -> f64 {
        match field {
            ReadingField::CurrentRate => self.current_rate,
            ReadingField::NextRate => self.next_rate,
            ReadingField::SolarGeneration => self.solar_generation,
            ReadingField::DailyConsumption => self.daily_consumption,
            ReadingField::DailyFeedIn => self.daily_feed_in,
            ReadingField::AverageDailyUse => self.average_daily_use,
        }
    }

    fn get_mut(&mut self, field: ReadingField) -> &mut f64 {
        match field {
            ReadingField::CurrentRate => &mut self.current_rate,
            ReadingField::NextRate => &mut self.next_rate,
            ReadingField::SolarGeneration => &mut self.solar_generation,
            ReadingField::DailyConsumption => &mut self.daily_consumption,
            ReadingField::DailyFeedIn => &mut self.daily_feed_in,
            ReadingField::AverageDailyUse => &mut self.average_daily_use,
        }
    }

    pub fn fields(&self) -> [(ReadingField, f64); 6] {
        ReadingField::ALL.map(|f| (f, self.get(f)))
    }

    /// Replaces NaN and infinities with `0.0` so every published value is
    /// a real number.
    pub fn sanitized(mut self) -> Self {
        for field in ReadingField::ALL {
            let value = self.get_mut(field);
            if !value.is_finite() {
                tracing::warn!("{} was {}, publishing 0.0", field, value);
                *value = 0.0;
            }
        }
        self
    }
}

/// Which tier of the extraction pipeline produced a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Csv,
    Scrape,
    Defaults,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::Csv => "csv",
            Tier::Scrape => "scrape",
            Tier::Defaults => "defaults",
        })
    }
}

/// What an update cycle produced. Every variant carries a full reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// The CSV export parsed; every value is backed by portal data.
    Complete { reading: EnergyReading },
    /// Only the HTML pages were usable. `missing` lists the values that are
    /// placeholders, `reason` why the export was skipped.
    Degraded {
        reading: EnergyReading,
        missing: Vec<ReadingField>,
        reason: String,
    },
    /// Nothing worked; the reading is the defaults.
    Fallback {
        reading: EnergyReading,
        reason: String,
    },
}

impl CycleOutcome {
    pub fn reading(&self) -> &EnergyReading {
        match self {
            CycleOutcome::Complete { reading }
            | CycleOutcome::Degraded { reading, .. }
            | CycleOutcome::Fallback { reading, .. } => reading,
        }
    }

    pub fn tier(&self) -> Tier {
        match self {
            CycleOutcome::Complete { .. } => Tier::Csv,
            CycleOutcome::Degraded { .. } => Tier::Scrape,
            CycleOutcome::Fallback { .. } => Tier::Defaults,
        }
    }

    /// Whether the portal answered at all. Only these outcomes move the
    /// last-success timestamp.
    pub fn reached_portal(&self) -> bool {
        !matches!(self, CycleOutcome::Fallback { .. })
    }

    pub fn missing(&self) -> &[ReadingField] {
        match self {
            CycleOutcome::Complete { .. } => &[],
            CycleOutcome::Degraded { missing, .. } => missing,
            CycleOutcome::Fallback { .. } => &ReadingField::ALL,
        }
    }
}
