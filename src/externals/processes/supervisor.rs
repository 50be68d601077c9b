use std::time::Duration;

use thiserror::Error;
use tokio::process::ChildStdout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ExporterConfig, ProcessCommand};

use super::services::{ProcessError, ProcessState, SupervisedProcess, Termination};

const RADIO_SERVER: &str = "radio server";
const DECODER: &str = "decoder";

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to start supervised process. Error: {0}")]
    Startup(#[from] ProcessError),

    #[error("The decoder's standard output was not captured.")]
    MissingStdout,

    #[error("Cancelled while starting.")]
    Cancelled,
}

/// Owns the radio server and the decoder for one run.
pub struct Supervisor {
    radio_server_command: ProcessCommand,
    decoder_command: ProcessCommand,
    warmup: Duration,
    radio_server: Option<SupervisedProcess>,
    decoder: Option<SupervisedProcess>,
}

impl Supervisor {
    pub fn new(config: &ExporterConfig) -> Self {
        Self {
            radio_server_command: config.radio_server.clone(),
            decoder_command: config.decoder.clone(),
            warmup: config.warmup,
            radio_server: None,
            decoder: None,
        }
    }

    /// Start the radio server, give it `warmup` to initialize, then start the
    /// decoder and hand back its standard output.
    /// A spawn failure is returned as is; the caller is expected to [`Supervisor::stop`]
    /// whatever did start.
    #[instrument(skip_all)]
    pub async fn start(&mut self, token: &CancellationToken) -> Result<ChildStdout, SupervisorError> {
        info!("Starting {} ({}).", RADIO_SERVER, self.radio_server_command);
        self.radio_server = Some(SupervisedProcess::spawn(
            RADIO_SERVER,
            &self.radio_server_command,
            false,
        )?);

        debug!("Waiting {:?} for the {} to initialize.", self.warmup, RADIO_SERVER);
        tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelled during warmup.");
                return Err(SupervisorError::Cancelled);
            },
            _ = tokio::time::sleep(self.warmup) => {}
        };

        info!("Starting {} ({}).", DECODER, self.decoder_command);
        let mut decoder = SupervisedProcess::spawn(DECODER, &self.decoder_command, true)?;
        let stdout = decoder.take_stdout();
        self.decoder = Some(decoder);

        stdout.ok_or(SupervisorError::MissingStdout)
    }

    /// Kill the radio server and interrupt the decoder. Safe to call more than
    /// once; a failure on one process never skips the other.
    #[instrument(skip_all)]
    pub fn stop(&mut self) {
        if let Some(radio_server) = self.radio_server.as_mut() {
            if radio_server.state() == ProcessState::Running {
                info!("Stopping {}.", radio_server.name());
            }
            if let Err(e) = radio_server.terminate(Termination::Kill) {
                warn!("{}", e);
            }
        }
        if let Some(decoder) = self.decoder.as_mut() {
            if decoder.state() == ProcessState::Running {
                info!("Stopping {}.", decoder.name());
            }
            if let Err(e) = decoder.terminate(Termination::Interrupt) {
                warn!("{}", e);
            }
        }
    }

    /// Wait up to `grace` for each stopped process to exit, killing any that
    /// are still around afterwards.
    #[instrument(skip_all)]
    pub async fn reap(&mut self, grace: Duration) {
        for process in [self.radio_server.as_mut(), self.decoder.as_mut()]
            .into_iter()
            .flatten()
        {
            match tokio::time::timeout(grace, process.wait()).await {
                Ok(Ok(status)) => debug!("{} exited with {}.", process.name(), status),
                Ok(Err(e)) => error!("Failed to wait for {}. Error: {}", process.name(), e),
                Err(_) => {
                    warn!("{} ignored the stop request, killing it.", process.name());
                    if let Err(e) = process.force_kill() {
                        error!("Failed to kill {}. Error: {}", process.name(), e);
                    } else if let Err(e) = process.wait().await {
                        error!("Failed to wait for {}. Error: {}", process.name(), e);
                    }
                }
            }
        }
    }

    /// True once the decoder was started and has exited.
    pub fn decoder_exited(&mut self) -> bool {
        self.decoder
            .as_mut()
            .map(|decoder| decoder.has_exited())
            .unwrap_or(false)
    }
}
