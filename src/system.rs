use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{sync::mpsc, time::Instant};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info, instrument, warn};

use crate::{
    config::ExporterConfig,
    exposition,
    externals::processes::supervisor::{Supervisor, SupervisorError},
    models::run_outcome::RunOutcome,
    sensor_cache::SensorCache,
    tasks::{
        cache_updater::task_update_sensor_cache,
        event_reader::task_read_decoder_events,
        poll_loop::{task_poll_targets, PollOutcome},
    },
};

/// How long stopped processes get to exit before they are killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Everything one run owns: the cache, the supervised processes and the
/// background tasks feeding the cache.
pub struct System {
    config: ExporterConfig,
    cache: SensorCache,
    supervisor: Supervisor,
    token: CancellationToken,
    tracker: TaskTracker,
}

impl System {
    /// `token` is the operator stop request.
    pub fn new(config: ExporterConfig, token: CancellationToken) -> Self {
        let supervisor = Supervisor::new(&config);
        Self {
            config,
            cache: SensorCache::new(),
            supervisor,
            token,
            tracker: TaskTracker::new(),
        }
    }

    /// Start the processes, wait for every target and export them.
    /// Processes are stopped on every path out of here.
    #[instrument(skip_all)]
    pub async fn run(mut self) -> Result<RunOutcome> {
        let result = self.collect_and_export().await;

        self.supervisor.stop();
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.supervisor.reap(SHUTDOWN_GRACE).await;

        match &result {
            Ok(outcome) => info!("Finished: {}", outcome),
            Err(e) => error!("Failed: {:#}", e),
        }
        result
    }

    async fn collect_and_export(&mut self) -> Result<RunOutcome> {
        // The warmup counts against the timeout.
        let deadline = Instant::now() + self.config.timeout;

        let started = tokio::time::timeout_at(deadline, self.supervisor.start(&self.token)).await;
        let decoder_output = match started {
            Err(_) => {
                warn!("Timed out while starting the radio receiver chain.");
                return Ok(RunOutcome::TimedOut);
            }
            Ok(Ok(stdout)) => stdout,
            Ok(Err(SupervisorError::Cancelled)) => return Ok(RunOutcome::Interrupted),
            Ok(Err(e)) => return Err(e).context("Failed to start the radio receiver chain"),
        };

        let decoder_finished = CancellationToken::new();
        let (tx_records, rx_records) = mpsc::channel(32);

        let token_clone = self.token.clone();
        self.tracker.spawn(async move {
            task_read_decoder_events(token_clone, decoder_output, tx_records).await
        });

        let token_clone = self.token.clone();
        let decoder_finished_clone = decoder_finished.clone();
        let cache_clone = self.cache.clone();
        self.tracker.spawn(async move {
            task_update_sensor_cache(token_clone, decoder_finished_clone, rx_records, cache_clone)
                .await
        });

        let outcome = task_poll_targets(
            self.token.clone(),
            decoder_finished,
            self.cache.clone(),
            self.config.targets.clone(),
            deadline,
            self.config.poll_interval,
        )
        .await;

        match outcome {
            PollOutcome::Complete(readings) => {
                exposition::export(&self.config.promfile, &readings)
                    .context("Failed to write the exposition file")?;
                Ok(RunOutcome::Exported)
            }
            PollOutcome::TimedOut => Ok(RunOutcome::TimedOut),
            PollOutcome::Interrupted => Ok(RunOutcome::Interrupted),
            PollOutcome::DecoderExited => {
                if self.supervisor.decoder_exited() {
                    warn!("The decoder process exited early.");
                }
                Ok(RunOutcome::DecoderExited)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ProcessCommand, models::target_set::TargetSet};
    use std::{fs, path::Path};
    use tempfile::tempdir;

    fn config(promfile: &Path, decoder_script: &str, timeout: Duration) -> ExporterConfig {
        ExporterConfig {
            promfile: promfile.to_path_buf(),
            targets: TargetSet::new(["101", "202"]).expect("Failed to build targets."),
            timeout,
            poll_interval: Duration::from_millis(50),
            warmup: Duration::from_millis(10),
            radio_server: ProcessCommand::new("sh", ["-c", "exec sleep 30"]),
            decoder: ProcessCommand::new("sh", ["-c", decoder_script]),
        }
    }

    const BOTH_METERS: &str = r#"sleep 0.1
echo '{"Type":"SCM","Message":{"ID":101,"Consumption":12345}}'
echo 'not json'
sleep 0.1
echo '{"Type":"IDM","Message":{"ID":202,"Consumption":67890}}'
exec sleep 30"#;

    const ONE_METER: &str = r#"echo '{"Type":"SCM","Message":{"ID":101,"Consumption":12345}}'
exec sleep 30"#;

    #[tokio::test]
    async fn test_exports_all_targets() {
        let tmp = tempdir().expect("Failed to create temp dir.");
        let promfile = tmp.path().join("meters.prom");
        let system = System::new(
            config(&promfile, BOTH_METERS, Duration::from_secs(10)),
            CancellationToken::new(),
        );

        let outcome = system.run().await.expect("Run failed.");
        assert_eq!(outcome, RunOutcome::Exported);
        assert_eq!(
            fs::read_to_string(&promfile).expect("Failed to read exposition file."),
            "# HELP meter_consumption The consumption value for a smart meter.\n\
             # TYPE meter_consumption counter\n\
             meter_consumption{meter_id=\"101\", meter_type=\"SCM\"} 12345\n\
             meter_consumption{meter_id=\"202\", meter_type=\"IDM\"} 67890\n"
        );
    }

    const PREVIOUS_EXPORT: &str = "meter_consumption{meter_id=\"101\", meter_type=\"SCM\"} 1\n";

    #[tokio::test]
    async fn test_timeout_leaves_no_file() {
        let tmp = tempdir().expect("Failed to create temp dir.");
        let promfile = tmp.path().join("meters.prom");
        let system = System::new(
            config(&promfile, ONE_METER, Duration::from_millis(300)),
            CancellationToken::new(),
        );

        let outcome = system.run().await.expect("Run failed.");
        assert_eq!(outcome, RunOutcome::TimedOut);
        assert!(!promfile.exists());
    }

    #[tokio::test]
    async fn test_timeout_keeps_previous_file() {
        let tmp = tempdir().expect("Failed to create temp dir.");
        let promfile = tmp.path().join("meters.prom");
        fs::write(&promfile, PREVIOUS_EXPORT).expect("Failed to seed file.");
        let system = System::new(
            config(&promfile, ONE_METER, Duration::from_millis(300)),
            CancellationToken::new(),
        );

        let outcome = system.run().await.expect("Run failed.");
        assert_eq!(outcome, RunOutcome::TimedOut);
        assert_eq!(
            fs::read_to_string(&promfile).expect("Failed to read file."),
            PREVIOUS_EXPORT
        );
    }

    #[tokio::test]
    async fn test_timeout_includes_warmup() {
        let tmp = tempdir().expect("Failed to create temp dir.");
        let promfile = tmp.path().join("meters.prom");
        let mut cfg = config(&promfile, "exec sleep 30", Duration::from_secs(1));
        cfg.warmup = Duration::from_secs(2);

        let started = Instant::now();
        let outcome = System::new(cfg, CancellationToken::new())
            .run()
            .await
            .expect("Run failed.");

        assert_eq!(outcome, RunOutcome::TimedOut);
        assert!(
            started.elapsed() < Duration::from_millis(1900),
            "Timed out only after {:?}.",
            started.elapsed()
        );
        assert!(!promfile.exists());
    }

    #[tokio::test]
    async fn test_timeout_shortly_after_warmup() {
        let tmp = tempdir().expect("Failed to create temp dir.");
        let promfile = tmp.path().join("meters.prom");
        let mut cfg = config(&promfile, "exec sleep 30", Duration::from_millis(600));
        cfg.warmup = Duration::from_millis(500);

        let started = Instant::now();
        let outcome = System::new(cfg, CancellationToken::new())
            .run()
            .await
            .expect("Run failed.");

        assert_eq!(outcome, RunOutcome::TimedOut);
        assert!(
            started.elapsed() < Duration::from_millis(1000),
            "Timed out only after {:?}.",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn test_decoder_exit_ends_run_early() {
        let tmp = tempdir().expect("Failed to create temp dir.");
        let promfile = tmp.path().join("meters.prom");
        fs::write(&promfile, PREVIOUS_EXPORT).expect("Failed to seed file.");
        let script = r#"echo '{"Type":"SCM","Message":{"ID":101,"Consumption":1}}'"#;
        let system = System::new(
            config(&promfile, script, Duration::from_secs(10)),
            CancellationToken::new(),
        );

        let outcome = system.run().await.expect("Run failed.");
        assert_eq!(outcome, RunOutcome::DecoderExited);
        assert_eq!(
            fs::read_to_string(&promfile).expect("Failed to read file."),
            PREVIOUS_EXPORT
        );
    }

    #[tokio::test]
    async fn test_interrupt_stops_run() {
        let tmp = tempdir().expect("Failed to create temp dir.");
        let promfile = tmp.path().join("meters.prom");
        let token = CancellationToken::new();
        let system = System::new(
            config(&promfile, ONE_METER, Duration::from_secs(10)),
            token.clone(),
        );

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });

        let outcome = system.run().await.expect("Run failed.");
        stopper.await.expect("Stopper panicked.");
        assert_eq!(outcome, RunOutcome::Interrupted);
        assert!(!promfile.exists());
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let tmp = tempdir().expect("Failed to create temp dir.");
        let mut cfg = config(&tmp.path().join("m.prom"), ONE_METER, Duration::from_secs(1));
        cfg.radio_server = ProcessCommand::new("/nonexistent/rtl_tcp", Vec::<String>::new());

        let result = System::new(cfg, CancellationToken::new()).run().await;
        assert!(result.is_err());
    }
}
