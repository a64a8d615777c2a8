//! Command Relay: stop-and-wait, coalescing forwarding of operator commands.
//!
//! Only the latest submitted command is kept (in [`CommandLink::pending`]).
//! A periodic tick sends it when nothing is awaiting acknowledgment, so a
//! burst of input collapses to its most recent value. Stop commands skip
//! the tick: they go out at once and are sent a second time one interval
//! later unless a newer command supersedes them.

use std::time::Duration;

use teleop_types::Command;
use tokio::time::Instant;

use crate::state::CommandLink;

/// How a submitted command should be handled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dispatch {
    /// Send right now.
    Immediate(Command),
    /// Store as the pending command for the next tick.
    Coalesce(Command),
}

#[derive(Debug)]
pub struct CommandRelay {
    interval: Duration,
    resend: Option<(Command, Instant)>,
}

impl CommandRelay {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            resend: None,
        }
    }

    /// Sampling period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Route a newly submitted command.
    ///
    /// Any scheduled stop resend is dropped, since `command` is newer.
    pub fn submit(&mut self, command: Command, now: Instant) -> Dispatch {
        if command.is_stop() {
            self.resend = Some((command, now + self.interval));
            Dispatch::Immediate(command)
        } else {
            self.resend = None;
            Dispatch::Coalesce(command)
        }
    }

    /// The command to send on a tick, if any.
    pub fn sample(link: &CommandLink) -> Option<Command> {
        if link.is_awaiting_ack {
            None
        } else {
            link.pending
        }
    }

    /// When the scheduled stop resend is due.
    pub fn resend_deadline(&self) -> Option<Instant> {
        self.resend.map(|(_, at)| at)
    }

    /// Take the stop resend if it is due at `now`.
    pub fn take_resend(&mut self, now: Instant) -> Option<Command> {
        match self.resend {
            Some((command, at)) if at <= now => {
                self.resend = None;
                Some(command)
            }
            _ => None,
        }
    }

    /// Forget any scheduled resend.
    pub fn cancel(&mut self) {
        self.resend = None;
    }
}
