//! Three-tier extraction: CSV export, then HTML scraping, then defaults.
//!
//! A cycle always ends with a full, finite reading. Which tier produced it
//! is reported through [`CycleOutcome`].

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use meridian_portal::PortalSession;

use crate::csv_export::summarize_export;
use crate::patterns::ExtractionPatterns;
use crate::rates::extract_rates;
use crate::reading::{CycleOutcome, EnergyReading, ReadingField};
use crate::usage::extract_usage;
use crate::SolarError;

/// Values the scrape tier cannot produce.
const SCRAPE_MISSING: [ReadingField; 3] = [
    ReadingField::SolarGeneration,
    ReadingField::DailyConsumption,
    ReadingField::DailyFeedIn,
];

pub struct ExtractionPipeline {
    patterns: Arc<ExtractionPatterns>,
    history_days: u32,
}

impl ExtractionPipeline {
    pub fn new(patterns: Arc<ExtractionPatterns>, history_days: u32) -> Self {
        Self {
            patterns,
            history_days,
        }
    }

    pub fn patterns(&self) -> &ExtractionPatterns {
        &self.patterns
    }

    /// Tier 1: download and parse the export, then add rates and the
    /// usage-chart average. The chart average wins; the export's own
    /// average fills in when the chart has none.
    pub async fn extract_from_csv(
        &self,
        session: &mut PortalSession,
        today: NaiveDate,
    ) -> Result<EnergyReading, SolarError> {
        session.ensure_authenticated().await?;
        let text = session.download_export().await?;
        let summary = summarize_export(&text, today, self.history_days)?;
        tracing::info!(
            "export parsed: {} rows, day {:?}",
            summary.record_count,
            summary.day.date
        );

        let quote = extract_rates(session, &self.patterns.rates).await;
        let usage = extract_usage(session, &self.patterns.usage).await;
        let average_daily_use = match (usage.average_daily_use, summary.average_daily_use) {
            (Some(chart), _) => chart,
            (None, Some(from_export)) => {
                tracing::info!("usage chart empty, using export average {:.2} kWh", from_export);
                from_export
            }
            (None, None) => 0.0,
        };

        Ok(EnergyReading {
            current_rate: quote.current_rate,
            next_rate: quote.next_rate,
            solar_generation: summary.day.solar_generation,
            daily_consumption: summary.day.daily_consumption,
            daily_feed_in: summary.day.daily_feed_in,
            average_daily_use,
        })
    }

    /// Tier 2: usage chart and rates only. Returns the reading and the
    /// fields that hold placeholders.
    pub async fn scrape_portal(
        &self,
        session: &mut PortalSession,
    ) -> Result<(EnergyReading, Vec<ReadingField>), SolarError> {
        session.ensure_authenticated().await?;

        let usage = extract_usage(session, &self.patterns.usage).await;
        let quote = extract_rates(session, &self.patterns.rates).await;

        let mut missing = SCRAPE_MISSING.to_vec();
        if !quote.found {
            missing.extend([ReadingField::CurrentRate, ReadingField::NextRate]);
        }
        if usage.average_daily_use.is_none() {
            missing.push(ReadingField::AverageDailyUse);
        }

        let reading = EnergyReading {
            current_rate: quote.current_rate,
            next_rate: quote.next_rate,
            average_daily_use: usage.average_daily_use.unwrap_or(0.0),
            ..EnergyReading::defaults(self.patterns.rates.fallback)
        };
        Ok((reading, missing))
    }

    /// One full cycle against the local date.
    pub async fn run_cycle(&self, session: &mut PortalSession) -> CycleOutcome {
        self.run_cycle_on(session, Local::now().date_naive()).await
    }

    /// One full cycle with an explicit "today". Never fails.
    pub async fn run_cycle_on(&self, session: &mut PortalSession, today: NaiveDate) -> CycleOutcome {
        session.begin_cycle();

        let csv_error = match self.extract_from_csv(session, today).await {
            Ok(reading) => {
                tracing::info!("cycle complete from csv export");
                return CycleOutcome::Complete {
                    reading: reading.sanitized(),
                };
            }
            Err(e) => {
                tracing::warn!("csv tier failed: {}", e);
                e
            }
        };

        match self.scrape_portal(session).await {
            Ok((reading, missing)) => {
                tracing::info!("cycle degraded to page scraping, missing {:?}", missing);
                CycleOutcome::Degraded {
                    reading: reading.sanitized(),
                    missing,
                    reason: csv_error.to_string(),
                }
            }
            Err(e) => {
                tracing::warn!("portal unavailable, publishing defaults: {}", e);
                CycleOutcome::Fallback {
                    reading: EnergyReading::defaults(self.patterns.rates.fallback).sanitized(),
                    reason: e.to_string(),
                }
            }
        }
    }
}
