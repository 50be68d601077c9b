use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    exposition::MeterReading, models::target_set::TargetSet, sensor_cache::SensorCache,
};

/// Where the poll loop stands after looking at the cache once.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    /// Some targets have no reading yet.
    Waiting { missing: Vec<String> },
    /// Every target has a reading, in target order.
    Complete(Vec<MeterReading>),
}

/// How the poll loop ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Complete(Vec<MeterReading>),
    TimedOut,
    Interrupted,
    DecoderExited,
}

/// Look up every target once. A target counts as resolved when both its
/// record and the record's message are present.
pub fn evaluate(cache: &SensorCache, targets: &TargetSet) -> PollState {
    let mut readings = Vec::with_capacity(targets.len());
    let mut missing = vec![];

    for meter_id in targets.iter() {
        match (cache.get_record(meter_id), cache.get_message(meter_id)) {
            (Some(record), Some(_message)) => {
                info!(
                    "consumption for {} ({}) = {}",
                    meter_id,
                    record.meter_type.as_deref().unwrap_or("?"),
                    record
                        .consumption
                        .as_ref()
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "?".into())
                );
                readings.push(MeterReading {
                    meter_id: meter_id.to_string(),
                    meter_type: record.meter_type.clone(),
                    consumption: record.consumption.clone(),
                });
            }
            _ => {
                info!("{}: not found", meter_id);
                missing.push(meter_id.to_string());
            }
        }
    }

    if missing.is_empty() {
        PollState::Complete(readings)
    } else {
        PollState::Waiting { missing }
    }
}

/// Task: Every `poll_interval` check whether all targets have a reading.
/// The deadline is checked before each sleep, so the loop can overrun
/// `deadline` by up to one interval.
/// Ends early when cancelled, or when `decoder_finished` fires and the cache
/// still lacks a target.
#[tracing::instrument(skip_all)]
pub async fn task_poll_targets(
    token: CancellationToken,
    decoder_finished: CancellationToken,
    cache: SensorCache,
    targets: TargetSet,
    deadline: Instant,
    poll_interval: Duration,
) -> PollOutcome {
    info!("Started. Waiting for {} targets: {}", targets.len(), targets);
    let mut decoder_gone = false;

    loop {
        if Instant::now() > deadline {
            warn!("Timed out.");
            return PollOutcome::TimedOut;
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                warn!("Cancelled.");
                return PollOutcome::Interrupted;
            },
            _ = decoder_finished.cancelled(), if !decoder_gone => {
                warn!("Decoder finished, checking collected readings one last time.");
                decoder_gone = true;
            },
            _ = tokio::time::sleep(poll_interval) => {}
        };

        match evaluate(&cache, &targets) {
            PollState::Complete(readings) => {
                debug!("All {} targets resolved.", readings.len());
                return PollOutcome::Complete(readings);
            }
            PollState::Waiting { .. } if token.is_cancelled() => {
                warn!("Cancelled.");
                return PollOutcome::Interrupted;
            }
            PollState::Waiting { missing } if decoder_gone => {
                warn!("Decoder is gone with {} targets unresolved.", missing.len());
                return PollOutcome::DecoderExited;
            }
            PollState::Waiting { missing } => {
                debug!("Still waiting on {} targets.", missing.len());
            }
        }
    }
}
