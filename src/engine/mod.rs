mod commands;
mod controller;
mod in_flight;
mod outcome;
#[cfg(test)]
pub(crate) mod testing;

pub use commands::{dispatch, handle_line, Command, CommandError};
pub use controller::{snooze_duration, EngineConfig, SpotEngine, MAX_SNOOZE_HOURS};
pub use outcome::{CheckOutcome, PassSummary, SkipReason, SpotCheckResult};
