// Alarm domain types.
pub mod alarm;
pub mod repeat;
pub mod trigger;

pub use alarm::{Alarm, AlarmId, ChallengeType, DEFAULT_LABEL, DEFAULT_SOUND, parse_clock};
pub use repeat::RepeatDays;
pub use trigger::{ScheduledTrigger, TriggerKey, TriggerPayload};
