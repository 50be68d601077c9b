use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

use crate::{models::sensor_record::SensorRecord, sensor_cache::SensorCache};

/// Task: Store every emitted record in the cache, replacing older readings
/// for the same meter. Once the reader has gone away and the queue is
/// drained, cancels `decoder_finished`.
/// Can be cancelled.
#[tracing::instrument(skip_all)]
pub async fn task_update_sensor_cache(
    token: CancellationToken,
    decoder_finished: CancellationToken,
    mut rx_records: Receiver<SensorRecord>,
    cache: SensorCache,
) {
    info!("Started.");
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            },
            record = rx_records.recv() => match record {
                Some(record) => {
                    trace!("Received record for meter {}.", record.meter_id);
                    cache.put(record);
                },
                None => {
                    warn!("No more records will arrive, {} meters seen.", cache.len());
                    decoder_finished.cancel();
                    break;
                }
            },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Number;
    use tokio::sync::mpsc;

    fn record(line: &str) -> SensorRecord {
        SensorRecord::try_from(line).expect("Failed to parse record.")
    }

    #[tokio::test]
    async fn test_drains_queue_then_signals() {
        let (tx, rx) = mpsc::channel(8);
        let cache = SensorCache::new();
        let decoder_finished = CancellationToken::new();

        tx.send(record(r#"{"Type":"SCM","Message":{"ID":1,"Consumption":1}}"#))
            .await
            .expect("Failed to queue record.");
        tx.send(record(r#"{"Type":"SCM","Message":{"ID":1,"Consumption":2}}"#))
            .await
            .expect("Failed to queue record.");
        drop(tx);

        task_update_sensor_cache(
            CancellationToken::new(),
            decoder_finished.clone(),
            rx,
            cache.clone(),
        )
        .await;

        assert!(decoder_finished.is_cancelled());
        assert_eq!(cache.get_consumption("1"), Some(Number::from(2)));
    }

    #[tokio::test]
    async fn test_cancel_does_not_signal_decoder_finished() {
        let (_tx, rx) = mpsc::channel(8);
        let token = CancellationToken::new();
        let decoder_finished = CancellationToken::new();
        token.cancel();

        task_update_sensor_cache(token, decoder_finished.clone(), rx, SensorCache::new()).await;
        assert!(!decoder_finished.is_cancelled());
    }
}
