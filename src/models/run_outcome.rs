use std::fmt::Display;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every target resolved and the exposition file was written.
    Exported,
    /// The deadline passed with at least one target unresolved.
    TimedOut,
    /// The operator asked us to stop.
    Interrupted,
    /// The decoder stopped producing output before every target resolved.
    DecoderExited,
}

impl RunOutcome {
    pub fn exit_code(self) -> u8 {
        match self {
            RunOutcome::Exported => 0,
            RunOutcome::TimedOut => 1,
            // NOTE: Matches a clean stop, not a failure.
            RunOutcome::Interrupted => 0,
            RunOutcome::DecoderExited => 3,
        }
    }
}

impl Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunOutcome::Exported => "exported",
            RunOutcome::TimedOut => "timed out",
            RunOutcome::Interrupted => "interrupted",
            RunOutcome::DecoderExited => "decoder exited",
        };
        write!(f, "<RunOutcome: {}>", name)
    }
}
