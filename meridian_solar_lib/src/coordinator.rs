//! Periodic update coordinator.
//!
//! Owns the portal session and runs extraction cycles on a fixed interval.
//! The session sits behind an async mutex, so cycles, self-tests and
//! shutdown never overlap.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use meridian_portal::PortalSession;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::diagnostics::{run_self_test, DiagnosticsSnapshot};
use crate::patterns::ExtractionPatterns;
use crate::pipeline::ExtractionPipeline;
use crate::reading::CycleOutcome;
use crate::SolarError;

#[derive(Default)]
struct CycleStatus {
    last_success: Option<DateTime<Utc>>,
    last_outcome: Option<CycleOutcome>,
}

pub struct Coordinator {
    session: tokio::sync::Mutex<PortalSession>,
    pipeline: ExtractionPipeline,
    scan_interval: Duration,
    status: Mutex<CycleStatus>,
}

impl Coordinator {
    /// Builds a coordinator from validated config, loading the pattern
    /// table from `patterns_file` when one is set.
    pub fn new(config: &Config) -> Result<Self, SolarError> {
        let patterns = match config.patterns_file.as_deref() {
            Some(path) => load_patterns(path)?,
            None => ExtractionPatterns::embedded()?,
        };
        Self::with_patterns(config, Arc::new(patterns))
    }

    pub fn with_patterns(
        config: &Config,
        patterns: Arc<ExtractionPatterns>,
    ) -> Result<Self, SolarError> {
        let options = config.session_options(patterns.portal.clone());
        let session = PortalSession::new(config.credentials(), options)?;
        tracing::debug!("coordinator configured: {:?}", config);
        Ok(Self {
            session: tokio::sync::Mutex::new(session),
            pipeline: ExtractionPipeline::new(patterns, config.history_days),
            scan_interval: config.scan_interval(),
            status: Mutex::new(CycleStatus::default()),
        })
    }

    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    /// Logs in once and surfaces the exact failure. Meant for first-time
    /// setup, where a bad password must be reported rather than papered
    /// over with defaults.
    pub async fn validate_credentials(&self) -> Result<(), SolarError> {
        let mut session = self.session.lock().await;
        session.begin_cycle();
        session.authenticate().await?;
        Ok(())
    }

    /// Runs one extraction cycle now.
    pub async fn refresh(&self) -> CycleOutcome {
        self.refresh_on(chrono::Local::now().date_naive()).await
    }

    /// Runs one extraction cycle treating `today` as the current date.
    pub async fn refresh_on(&self, today: NaiveDate) -> CycleOutcome {
        let outcome = {
            let mut session = self.session.lock().await;
            self.pipeline.run_cycle_on(&mut session, today).await
        };

        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        if outcome.reached_portal() {
            status.last_success = Some(Utc::now());
        }
        status.last_outcome = Some(outcome.clone());
        outcome
    }

    pub fn last_outcome(&self) -> Option<CycleOutcome> {
        self.status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_outcome
            .clone()
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_success
    }

    /// Redacted state, optionally with a fresh self-test run.
    pub async fn diagnostics(&self, with_self_test: bool) -> DiagnosticsSnapshot {
        let (last_success, last_tier) = {
            let status = self.status.lock().unwrap_or_else(|e| e.into_inner());
            (
                status.last_success,
                status.last_outcome.as_ref().map(CycleOutcome::tier),
            )
        };

        let mut session = self.session.lock().await;
        let self_test = if with_self_test {
            Some(run_self_test(&mut session, self.pipeline.patterns()).await)
        } else {
            None
        };
        DiagnosticsSnapshot {
            self_test,
            ..DiagnosticsSnapshot::capture(&session, last_success, last_tier)
        }
    }

    /// Runs a cycle immediately and then every scan interval until
    /// `shutdown` resolves. A cycle in flight finishes before the loop exits.
    /// The session is closed on the way out.
    pub async fn run<F, S>(&self, mut on_cycle: F, shutdown: S)
    where
        F: FnMut(&CycleOutcome),
        S: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        tracing::info!(
            "updating every {} minutes",
            self.scan_interval.as_secs() / 60
        );
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = self.refresh().await;
                    on_cycle(&outcome);
                }
            }
        }

        self.stop().await;
    }

    /// Closes the session. Later cycles publish defaults until the
    /// session is reset.
    pub async fn stop(&self) {
        let mut session = self.session.lock().await;
        session.close();
        tracing::info!("portal session closed");
    }

    /// Drops cookies and login state so the next cycle starts clean.
    pub async fn reset_session(&self) -> Result<(), SolarError> {
        self.session.lock().await.reset()?;
        Ok(())
    }
}

fn load_patterns(path: &Path) -> Result<ExtractionPatterns, SolarError> {
    tracing::info!("loading extraction patterns from {}", path.display());
    Ok(ExtractionPatterns::from_file(path)?)
}
