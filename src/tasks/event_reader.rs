use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::mpsc::Sender,
};
use tokio_stream::{wrappers::SplitStream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::models::sensor_record::SensorRecord;

/// Task: Read decoder output line by line, parse each line into a
/// `SensorRecord` and emit it. Bad lines are logged and skipped.
/// Ends when the output is exhausted (decoder exited), when nobody is
/// listening anymore, or when cancelled. Dropping `tx_records` on exit is
/// what tells the consumer that no more records will arrive.
#[tracing::instrument(skip_all)]
pub async fn task_read_decoder_events(
    token: CancellationToken,
    decoder_output: impl AsyncRead + Unpin,
    tx_records: Sender<SensorRecord>,
) {
    info!("Started.");

    let mut lines = SplitStream::new(BufReader::new(decoder_output).split(b'\n'));

    loop {
        let line = tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            },
            line = lines.next() => line,
        };

        let line = match line {
            None => {
                info!("Decoder output ended.");
                break;
            }
            Some(Err(e)) => {
                error!("Failed to read decoder output. Error: {}", e);
                break;
            }
            Some(Ok(line)) => line,
        };

        let record = match decode_line(&line) {
            None => continue,
            Some(Err(e)) => {
                warn!("Skipping decoder line. {}", e);
                continue;
            }
            Some(Ok(record)) => record,
        };

        debug!("Decoded {}", record);
        if let Err(e) = tx_records.send(record).await {
            error!("Failed to queue decoded record. Error: {}", e);
            break;
        }
    }
}

/// Parse one raw line. `None` for blank lines.
fn decode_line(raw: &[u8]) -> Option<Result<SensorRecord, String>> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text.trim(),
        Err(e) => return Some(Err(format!("Line is not UTF-8. Error: {}", e))),
    };
    if text.is_empty() {
        trace!("Blank line.");
        return None;
    }
    Some(SensorRecord::try_from(text).map_err(|e| e.to_string()))
}
