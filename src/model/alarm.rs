// Stored alarm record and its small value types.
use super::repeat::RepeatDays;
use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};

pub type AlarmId = i64;

pub const DEFAULT_SOUND: &str = "Default";
pub const DEFAULT_LABEL: &str = "Alarm";

/// Task the user must solve before the ringing alarm can be dismissed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChallengeType {
    #[default]
    Math,
    Memory,
    Typing,
    Shake,
    None,
}

impl ChallengeType {
    /// Lenient parse: unknown tags fall back to the default challenge.
    pub fn from_tag(tag: &str) -> Self {
        ChallengeType::from_str(tag.trim()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: AlarmId,
    pub hour: u32,
    pub minute: u32,
    #[serde(default)]
    pub repeat_days: RepeatDays,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "default_sound")]
    pub sound: String,
    #[serde(default)]
    pub audio_file: Option<String>,
    #[serde(default)]
    pub challenge: ChallengeType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_sound() -> String {
    DEFAULT_SOUND.to_string()
}

fn default_enabled() -> bool {
    true
}

impl Alarm {
    /// Creates an enabled one-shot alarm. Out-of-range values wrap into 0-23 / 0-59.
    /// The id is assigned by the store on insert.
    pub fn new(hour: u32, minute: u32) -> Self {
        Self {
            id: 0,
            hour: hour % 24,
            minute: minute % 60,
            repeat_days: RepeatDays::NONE,
            label: None,
            sound: default_sound(),
            audio_file: None,
            challenge: ChallengeType::default(),
            enabled: true,
        }
    }

    pub fn with_repeat(mut self, days: RepeatDays) -> Self {
        self.repeat_days = days;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Re-applies the hour/minute invariant. Called by the store before persisting,
    /// since deserialized or hand-edited records can bypass `new`.
    pub fn normalize(&mut self) {
        self.hour %= 24;
        self.minute %= 60;
    }

    pub fn is_repeating(&self) -> bool {
        !self.repeat_days.is_empty()
    }

    pub fn display_label(&self) -> &str {
        self.label
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(DEFAULT_LABEL)
    }

    pub fn time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour % 24, self.minute % 60, 0).unwrap_or(NaiveTime::MIN)
    }

    /// 12-hour clock rendering, e.g. `7:05 AM`.
    pub fn formatted_time(&self) -> String {
        let ampm = if self.hour < 12 { "AM" } else { "PM" };
        let display_hour = match self.hour {
            0 => 12,
            h if h > 12 => h - 12,
            h => h,
        };
        format!("{}:{:02} {}", display_hour, self.minute, ampm)
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {:02}:{:02} {} [{}] {}",
            self.id,
            self.hour,
            self.minute,
            self.display_label(),
            self.repeat_days,
            if self.enabled { "on" } else { "off" }
        )
    }
}

/// Parses `HH:MM` (24h).
pub fn parse_clock(input: &str) -> anyhow::Result<(u32, u32)> {
    let time = NaiveTime::parse_from_str(input.trim(), "%H:%M")
        .map_err(|e| anyhow::anyhow!("Invalid time '{}': {}", input, e))?;
    Ok((time.hour(), time.minute()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_ranges() {
        let a = Alarm::new(25, 61);
        assert_eq!((a.hour, a.minute), (1, 1));
    }

    #[test]
    fn test_challenge_fallback() {
        assert_eq!(ChallengeType::from_tag("typing"), ChallengeType::Typing);
        assert_eq!(ChallengeType::from_tag("juggling"), ChallengeType::Math);
    }

    #[test]
    fn test_formatted_time() {
        assert_eq!(Alarm::new(0, 5).formatted_time(), "12:05 AM");
        assert_eq!(Alarm::new(13, 30).formatted_time(), "1:30 PM");
        assert_eq!(Alarm::new(12, 0).formatted_time(), "12:00 PM");
    }

    #[test]
    fn test_display_label_default() {
        let a = Alarm::new(7, 0).with_label("  ");
        assert_eq!(a.display_label(), "Alarm");
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("07:30").unwrap(), (7, 30));
        assert!(parse_clock("7h30").is_err());
    }
}
