use std::time::Duration;

/// Orchestrator operations reported to the observer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation {
    Get,
    Set,
    WarmCache,
    RecentIds,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Set => "set",
            Operation::WarmCache => "warm_cache",
            Operation::RecentIds => "recent_ids",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestOutcome {
    Ok,
    NotFound,
    Invalid,
    Error,
}

impl RequestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Ok => "ok",
            RequestOutcome::NotFound => "not_found",
            RequestOutcome::Invalid => "invalid",
            RequestOutcome::Error => "error",
        }
    }
}

/// What the consumer did with one stream message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageOutcome {
    /// Persisted and committed
    Persisted,
    /// Undecodable; committed without persisting
    Skipped,
    /// Decoded but not persisted; left uncommitted for re-delivery
    Failed,
    /// Persisted but the offset commit failed
    CommitFailed,
}

impl MessageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageOutcome::Persisted => "persisted",
            MessageOutcome::Skipped => "skipped",
            MessageOutcome::Failed => "failed",
            MessageOutcome::CommitFailed => "commit_failed",
        }
    }
}

/// Sink the pipeline reports to at well-defined points. Every hook defaults
/// to a no-op so sinks only implement what they record.
pub trait PipelineObserver: Send + Sync {
    fn request_started(&self, _operation: Operation) {}

    fn request_finished(&self, _operation: Operation, _outcome: RequestOutcome, _elapsed: Duration) {}

    fn cache_lookup(&self, _hit: bool) {}

    fn persisted(&self, _success: bool) {}

    fn message_processed(&self, _outcome: MessageOutcome) {}

    fn order_published(&self, _success: bool) {}

    fn circuit_transition(&self, _from: &str, _to: &str) {}
}
