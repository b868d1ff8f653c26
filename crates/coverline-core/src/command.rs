//! Command abstractions and the per-command execution context.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Trait that all commands implement.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the system.
    fn correlation_id(&self) -> Uuid;

    /// The user performing the command, if any.
    fn performing_user_id(&self) -> Option<Uuid> {
        None
    }
}

/// Abstraction over system time so that event timestamps are reproducible.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Everything an aggregate command method needs besides its own arguments.
///
/// Every event raised while executing one command shares the same
/// correlation id, performing user and clock.
#[derive(Clone, Copy)]
pub struct CommandContext<'a> {
    /// Correlation ID stamped onto every raised event.
    pub correlation_id: Uuid,
    /// The acting user, if the command was issued by one.
    pub performing_user_id: Option<Uuid>,
    /// Source of event timestamps.
    pub clock: &'a dyn Clock,
}

impl<'a> CommandContext<'a> {
    /// Creates a context with no performing user.
    #[must_use]
    pub fn new(correlation_id: Uuid, clock: &'a dyn Clock) -> Self {
        Self {
            correlation_id,
            performing_user_id: None,
            clock,
        }
    }

    /// Builds a context from a command's correlation and user identifiers.
    #[must_use]
    pub fn for_command(command: &dyn Command, clock: &'a dyn Clock) -> Self {
        Self {
            correlation_id: command.correlation_id(),
            performing_user_id: command.performing_user_id(),
            clock,
        }
    }

    /// Returns a copy of this context attributed to the given user.
    #[must_use]
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.performing_user_id = Some(user_id);
        self
    }

    /// Current time according to the context clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl std::fmt::Debug for CommandContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("correlation_id", &self.correlation_id)
            .field("performing_user_id", &self.performing_user_id)
            .finish_non_exhaustive()
    }
}
