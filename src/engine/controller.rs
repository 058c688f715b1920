use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use tokio::{sync::Semaphore, task::JoinSet, time};

use crate::{
    camera::{inspect_snapshot, Camera, ImageSource},
    db::{CheckRecord, CheckStage, Database, NewSpot, Spot, SpotPatch},
    error::{AdapterError, Result, SpotError},
    settings::Settings,
    stats::{summarize, SpotStats},
    vision::{occupancy_prompt, parse_verdict, RawVerdict, Verdict, VisionClassifier},
};

use super::{
    in_flight::InFlightChecks,
    outcome::{CheckOutcome, SkipReason, SpotCheckResult},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Longest accepted snooze.
pub const MAX_SNOOZE_HOURS: f64 = 24.0 * 366.0;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub image_fetch_timeout: Duration,
    pub classify_timeout: Duration,
    /// Upper bound on spots talking to the adapters at once.
    pub max_concurrent_checks: usize,
    /// History length returned when the caller gives no limit.
    pub history_limit: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for EngineConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            image_fetch_timeout: settings.image_fetch_timeout(),
            classify_timeout: settings.classify_timeout(),
            max_concurrent_checks: settings.max_concurrent_checks.max(1),
            history_limit: settings.history_limit,
        }
    }
}

struct AdapterFailure {
    stage: CheckStage,
    error: AdapterError,
}

impl AdapterFailure {
    fn at(stage: CheckStage) -> impl FnOnce(AdapterError) -> Self {
        move |error| Self { stage, error }
    }
}

/// Runs occupancy checks and owns every mutation of spot state.
#[derive(Clone)]
pub struct SpotEngine {
    db: Database,
    camera: Arc<dyn ImageSource>,
    classifier: Arc<dyn VisionClassifier>,
    in_flight: InFlightChecks,
    adapter_permits: Arc<Semaphore>,
    config: EngineConfig,
}

impl SpotEngine {
    pub fn new(
        db: Database,
        camera: Arc<dyn ImageSource>,
        classifier: Arc<dyn VisionClassifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            camera,
            classifier,
            in_flight: InFlightChecks::default(),
            adapter_permits: Arc::new(Semaphore::new(config.max_concurrent_checks.max(1))),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch a snapshot, classify it and record the result.
    ///
    /// Every attempt that reaches the adapters appends exactly one record.
    /// Only a completed classification moves the spot's state.
    pub async fn check(&self, spot_id: &str, force: bool) -> Result<CheckOutcome> {
        let _guard = self.in_flight.try_acquire(spot_id)?;
        let spot = self.db.get_spot(spot_id).await?;

        let now = Utc::now();
        if !force && spot.is_snoozed_at(now) {
            log_debug!("Skipping check for snoozed spot {}", spot.id);
            return Ok(CheckOutcome::Skipped {
                reason: SkipReason::Snoozed,
                state: spot.state,
                snoozed_until: spot.snoozed_until,
            });
        }

        let started = Instant::now();
        let attempt = self.run_adapters(&spot).await;
        let checked_at = Utc::now();

        match attempt {
            Ok((verdict, raw)) => {
                if let Some(anomaly) = &verdict.anomaly {
                    log_warn!("Classifier reply for spot {} is anomalous: {}", spot.id, anomaly);
                }

                let record = CheckRecord::success(
                    &spot.id,
                    checked_at,
                    verdict.state,
                    verdict.confidence,
                    verdict.explanation.clone(),
                    raw.text,
                );
                self.db
                    .record_check(&spot.id, &record, Some(verdict.state))
                    .await?;

                log_info!(
                    "Spot {} checked: {} -> {} in {:?}",
                    spot.id,
                    spot.state,
                    verdict.state,
                    started.elapsed()
                );
                Ok(CheckOutcome::Completed {
                    state: verdict.state,
                    previous_state: spot.state,
                    checked_at,
                    confidence: verdict.confidence,
                    explanation: verdict.explanation,
                })
            }
            Err(AdapterFailure { stage, error }) => {
                let message = error.to_string();
                let record = CheckRecord::failure(&spot.id, checked_at, stage, message.clone());
                self.db.append_check_record(&spot.id, &record).await?;

                log_warn!(
                    "Spot {} check failed during {} after {:?}: {}",
                    spot.id,
                    stage.as_str(),
                    started.elapsed(),
                    message
                );
                Ok(CheckOutcome::Failed {
                    stage,
                    error: message,
                    state: spot.state,
                })
            }
        }
    }

    async fn run_adapters(
        &self,
        spot: &Spot,
    ) -> std::result::Result<(Verdict, RawVerdict), AdapterFailure> {
        // Waiting for a permit is not part of either adapter timeout.
        let _permit = self
            .adapter_permits
            .acquire()
            .await
            .map_err(|err| AdapterFailure {
                stage: CheckStage::ImageFetch,
                error: AdapterError::Transport(err.to_string()),
            })?;

        let bytes = within(
            self.config.image_fetch_timeout,
            self.camera.fetch(&spot.image_source_ref),
        )
        .await
        .map_err(AdapterFailure::at(CheckStage::ImageFetch))?;
        let snapshot =
            inspect_snapshot(bytes).map_err(AdapterFailure::at(CheckStage::ImageFetch))?;
        log_debug!(
            "Snapshot for spot {}: {}x{} {}",
            spot.id,
            snapshot.width,
            snapshot.height,
            snapshot.mime_type
        );

        let prompt = occupancy_prompt(spot);
        let raw = within(
            self.config.classify_timeout,
            self.classifier
                .classify(&snapshot.bytes, snapshot.mime_type, &prompt),
        )
        .await
        .map_err(AdapterFailure::at(CheckStage::Classification))?;

        Ok((parse_verdict(&raw.text), raw))
    }

    /// Check every spot concurrently. Results follow `list_spots` order and one
    /// spot's failure never affects another's entry.
    pub async fn check_all(&self, force: bool) -> Result<Vec<SpotCheckResult>> {
        let spots = self.db.list_spots().await?;
        let started = Instant::now();

        let mut tasks = JoinSet::new();
        for (index, spot) in spots.iter().enumerate() {
            let engine = self.clone();
            let spot_id = spot.id.clone();
            tasks.spawn(async move {
                let outcome = engine.check(&spot_id, force).await;
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<Result<CheckOutcome>>> =
            spots.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(err) => log_error!("Check task ended abnormally: {}", err),
            }
        }

        let results: Vec<SpotCheckResult> = spots
            .into_iter()
            .zip(outcomes)
            .map(|(spot, outcome)| SpotCheckResult {
                outcome: outcome.unwrap_or_else(|| {
                    Err(SpotError::Store(anyhow::anyhow!(
                        "check task for spot {} did not finish",
                        spot.id
                    )))
                }),
                spot_id: spot.id,
            })
            .collect();

        log_info!(
            "Checked {} spots in {:?}",
            results.len(),
            started.elapsed()
        );
        Ok(results)
    }

    /// Clear history, state and snooze. Callers confirm before invoking.
    ///
    /// Refused with `InProgress` while a check for the spot is running, since
    /// that check would write its result over the reset.
    pub async fn reset(&self, spot_id: &str) -> Result<()> {
        let _guard = self.in_flight.try_acquire(spot_id)?;
        self.db.reset_spot(spot_id).await?;
        log_info!("Spot {} reset", spot_id);
        Ok(())
    }

    /// Snooze until now + `hours`, replacing any earlier snooze.
    pub async fn snooze(&self, spot_id: &str, hours: f64) -> Result<chrono::DateTime<Utc>> {
        let duration = snooze_duration(hours)?;
        let until = Utc::now() + duration;
        self.db.set_snooze(spot_id, Some(until)).await?;
        log_info!("Spot {} snoozed until {}", spot_id, until);
        Ok(until)
    }

    pub async fn unsnooze(&self, spot_id: &str) -> Result<()> {
        self.db.clear_snooze(spot_id).await?;
        log_info!("Spot {} snooze cleared", spot_id);
        Ok(())
    }

    /// Remove a spot and its history. A check already running for it ends in
    /// `NotFound` when it tries to record.
    pub async fn delete(&self, spot_id: &str) -> Result<()> {
        self.db.delete_spot(spot_id).await?;
        log_info!("Spot {} deleted", spot_id);
        Ok(())
    }

    pub async fn create_spot(&self, input: NewSpot) -> Result<Spot> {
        let spot = self.db.create_spot(input).await?;
        log_info!("Spot {} created ({})", spot.id, spot.name);
        Ok(spot)
    }

    pub async fn update_spot(&self, spot_id: &str, patch: SpotPatch) -> Result<Spot> {
        self.db.update_spot(spot_id, patch).await
    }

    pub async fn get_spot(&self, spot_id: &str) -> Result<Spot> {
        self.db.get_spot(spot_id).await
    }

    pub async fn list_spots(&self) -> Result<Vec<Spot>> {
        self.db.list_spots().await
    }

    pub async fn spot_count(&self) -> Result<u64> {
        self.db.count_spots().await
    }

    /// Newest records, oldest first. Defaults to the configured history limit.
    pub async fn history(&self, spot_id: &str, limit: Option<u64>) -> Result<Vec<CheckRecord>> {
        let limit = limit.unwrap_or(self.config.history_limit);
        if i64::try_from(limit).is_err() {
            return Err(SpotError::Validation(format!(
                "history limit must be at most {}, got {limit}",
                i64::MAX
            )));
        }
        self.db.list_history(spot_id, Some(limit)).await
    }

    pub async fn stats(&self, spot_id: &str) -> Result<SpotStats> {
        let records = self.db.list_history(spot_id, None).await?;
        Ok(summarize(&records))
    }

    pub async fn list_cameras(&self) -> std::result::Result<Vec<Camera>, AdapterError> {
        within(self.config.image_fetch_timeout, self.camera.list_cameras()).await
    }
}

/// Validate a snooze length given in hours.
pub fn snooze_duration(hours: f64) -> Result<chrono::Duration> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(SpotError::Validation(format!(
            "snooze hours must be a positive number, got {hours}"
        )));
    }
    if hours > MAX_SNOOZE_HOURS {
        return Err(SpotError::Validation(format!(
            "snooze hours must be at most {MAX_SNOOZE_HOURS}, got {hours}"
        )));
    }

    let millis = (hours * 3_600_000.0).round() as i64;
    if millis == 0 {
        return Err(SpotError::Validation(format!(
            "snooze of {hours} hours is too short"
        )));
    }
    Ok(chrono::Duration::milliseconds(millis))
}

async fn within<T>(
    limit: Duration,
    call: impl Future<Output = std::result::Result<T, AdapterError>>,
) -> std::result::Result<T, AdapterError> {
    match time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::Timeout),
    }
}
