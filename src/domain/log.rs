//! Lifecycle event logging for requests.
//!
//! Every line names who acted (`owner`), what happened (`verb`) and which
//! requests were involved (`ids`, as produced by `Request::log_id`).

use tracing::debug;

/// Component emitting a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// The public facade.
    Main,
    /// The dispatcher actor.
    Dispatcher,
    /// A worker running a hunt.
    Hunter,
}

impl Owner {
    /// Label used in log lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "Main",
            Self::Dispatcher => "Dispatcher",
            Self::Hunter => "Hunter",
        }
    }
}

/// What happened to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Verb {
    Created,
    Changed,
    Ignored,
    Enqueued,
    Canceled,
    Batched,
    Retrying,
    Executing,
    Decoded,
    Transformed,
    Joined,
    Removed,
    Delivered,
    Replaying,
    Completed,
    Errored,
    Paused,
    Resumed,
}

impl Verb {
    /// Label used in log lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Changed => "changed",
            Self::Ignored => "ignored",
            Self::Enqueued => "enqueued",
            Self::Canceled => "canceled",
            Self::Batched => "batched",
            Self::Retrying => "retrying",
            Self::Executing => "executing",
            Self::Decoded => "decoded",
            Self::Transformed => "transformed",
            Self::Joined => "joined",
            Self::Removed => "removed",
            Self::Delivered => "delivered",
            Self::Replaying => "replaying",
            Self::Completed => "completed",
            Self::Errored => "errored",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
        }
    }
}

/// Emits lifecycle events when enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventLog {
    enabled: bool,
}

impl EventLog {
    /// Creates a log that emits only when `enabled`.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Whether events are emitted.
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        self.enabled
    }

    /// Logs `verb` by `owner` for `ids`.
    pub fn log(self, owner: Owner, verb: Verb, ids: &str) {
        self.log_with(owner, verb, ids, "");
    }

    /// Like `log`, with a trailing detail such as an error or a key.
    pub fn log_with(self, owner: Owner, verb: Verb, ids: &str, extras: &str) {
        if self.enabled {
            debug!(
                owner = owner.as_str(),
                verb = verb.as_str(),
                ids,
                "{:<11} {:<12} {} {}",
                owner.as_str(),
                verb.as_str(),
                ids,
                extras
            );
        }
    }
}
