//! Client-side view of one run, owned exclusively by the reconciler.

use hostrun_core::events::StreamEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOutcome {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Terminal(TerminalOutcome),
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Terminal(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Placeholders shown until the first host starts reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootstrapFlags {
    pub status_done: bool,
    pub info_done: bool,
}

impl BootstrapFlags {
    pub fn force(&mut self) {
        self.status_done = true;
        self.info_done = true;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconciledState {
    pub log: Vec<StreamEvent>,
    pub stats: Stats,
    pub flags: BootstrapFlags,
    pub phase: RunPhase,
    pub frames_received: u64,
    pub protocol_errors: u64,
}

impl ReconciledState {
    pub fn terminal(&self) -> Option<TerminalOutcome> {
        match self.phase {
            RunPhase::Terminal(outcome) => Some(outcome),
            _ => None,
        }
    }
}
