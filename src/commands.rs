use serde::{Deserialize, Serialize};
use tracing::debug;

/// Actions a remote operator can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandAction {
    /// Sound `beeps` buzzer/LED pulses of `on_ms` each.
    StartAlert { on_ms: u32, beeps: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub name: &'static str,
    pub action: CommandAction,
}

pub const COMMAND_TABLE: &[CommandEntry] = &[CommandEntry {
    name: "startAlert",
    action: CommandAction::StartAlert { on_ms: 750, beeps: 10 },
}];

/// Receiver of dispatched actions.
pub trait CommandSink {
    fn execute(&mut self, action: CommandAction);
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DispatchStats {
    pub handled: u32,
    pub unknown: u32,
}

#[derive(Debug)]
pub struct CommandDispatcher {
    table: &'static [CommandEntry],
    stats: DispatchStats,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::with_table(COMMAND_TABLE)
    }

    pub fn with_table(table: &'static [CommandEntry]) -> Self {
        Self {
            table,
            stats: DispatchStats::default(),
        }
    }

    pub fn lookup(&self, payload: &str) -> Option<CommandAction> {
        self.table
            .iter()
            .find(|entry| entry.name == payload)
            .map(|entry| entry.action)
    }

    /// Exact-match `payload` against the table and run the bound action.
    /// Unknown payloads are ignored: the channel is shared and not every
    /// frame is meant as a command.
    pub fn dispatch<S: CommandSink + ?Sized>(&mut self, payload: &str, sink: &mut S) -> bool {
        match self.lookup(payload) {
            Some(action) => {
                debug!(payload, ?action, "command dispatched");
                sink.execute(action);
                self.stats.handled = self.stats.handled.wrapping_add(1);
                true
            }
            None => {
                debug!(payload, "unknown command ignored");
                self.stats.unknown = self.stats.unknown.wrapping_add(1);
                false
            }
        }
    }

    pub fn table(&self) -> &'static [CommandEntry] {
        self.table
    }

    pub fn get_stats(&self) -> &DispatchStats {
        &self.stats
    }
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
