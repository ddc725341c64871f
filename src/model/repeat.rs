// Repeat-day bitmask handling for recurring alarms.
//
// Bit layout: bit 0 = Monday ... bit 6 = Sunday. A mask of 0 means the
// alarm fires once. Anything above bit 6 is ignored.
use anyhow::Result;
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const WEEK_MASK: u8 = 0b0111_1111;
pub const WEEKDAYS_MASK: u8 = 0b0001_1111;
pub const WEEKENDS_MASK: u8 = 0b0110_0000;

const ALL_DAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Set of weekdays on which an alarm repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepeatDays(u8);

impl RepeatDays {
    pub const NONE: RepeatDays = RepeatDays(0);
    pub const EVERY_DAY: RepeatDays = RepeatDays(WEEK_MASK);

    /// Builds a set from a raw mask. Bits above Sunday are dropped.
    pub fn decode(mask: u32) -> Self {
        RepeatDays((mask & WEEK_MASK as u32) as u8)
    }

    /// Collapses a list of weekdays into a mask. Duplicates are harmless.
    pub fn encode<I>(days: I) -> u8
    where
        I: IntoIterator<Item = Weekday>,
    {
        days.into_iter()
            .fold(0u8, |mask, day| mask | Self::bit(day))
    }

    pub fn from_days<I>(days: I) -> Self
    where
        I: IntoIterator<Item = Weekday>,
    {
        RepeatDays(Self::encode(days))
    }

    pub fn mask(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn insert(&mut self, day: Weekday) {
        self.0 |= Self::bit(day);
    }

    pub fn remove(&mut self, day: Weekday) {
        self.0 &= !Self::bit(day);
    }

    /// Weekdays in the set, Monday first.
    pub fn iter(self) -> impl Iterator<Item = Weekday> {
        ALL_DAYS.into_iter().filter(move |d| self.contains(*d))
    }

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }

    /// Parses user input such as `mon,wed,fri`, `weekdays`, `weekends` or `daily`.
    /// An empty string or `once` yields an empty set.
    pub fn parse(input: &str) -> Result<Self> {
        let mut days = RepeatDays::NONE;
        for raw in input.split([',', ' ']) {
            let token = raw.trim().to_lowercase();
            if token.is_empty() {
                continue;
            }
            match token.as_str() {
                "once" | "never" => {}
                "daily" | "everyday" | "all" => days.0 |= WEEK_MASK,
                "weekdays" => days.0 |= WEEKDAYS_MASK,
                "weekends" => days.0 |= WEEKENDS_MASK,
                other => days.insert(parse_weekday(other)?),
            }
        }
        Ok(days)
    }
}

fn parse_weekday(token: &str) -> Result<Weekday> {
    let day = match token {
        "mo" | "mon" | "monday" => Weekday::Mon,
        "tu" | "tue" | "tues" | "tuesday" => Weekday::Tue,
        "we" | "wed" | "wednesday" => Weekday::Wed,
        "th" | "thu" | "thur" | "thurs" | "thursday" => Weekday::Thu,
        "fr" | "fri" | "friday" => Weekday::Fri,
        "sa" | "sat" | "saturday" => Weekday::Sat,
        "su" | "sun" | "sunday" => Weekday::Sun,
        _ => anyhow::bail!("Unknown weekday '{}'", token),
    };
    Ok(day)
}

impl fmt::Display for RepeatDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "Once"),
            WEEK_MASK => write!(f, "Every day"),
            WEEKDAYS_MASK => write!(f, "Weekdays"),
            WEEKENDS_MASK => write!(f, "Weekends"),
            _ => {
                let names: Vec<String> = self.iter().map(|d| d.to_string()).collect();
                write!(f, "{}", names.join(", "))
            }
        }
    }
}

impl From<u8> for RepeatDays {
    fn from(mask: u8) -> Self {
        RepeatDays::decode(mask as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ignores_high_bits() {
        let days = RepeatDays::decode(0b1_1000_0001);
        assert_eq!(days.mask(), 0b1000_0001 & WEEK_MASK);
        assert!(days.contains(Weekday::Mon));
        assert!(!days.contains(Weekday::Sun));
    }

    #[test]
    fn test_mask_roundtrip_full_domain() {
        for m in 0u32..=255 {
            let days = RepeatDays::decode(m);
            assert_eq!(RepeatDays::encode(days.iter()) as u32, m & WEEK_MASK as u32);
        }
    }

    #[test]
    fn test_encode_collapses_duplicates() {
        let mask = RepeatDays::encode([Weekday::Fri, Weekday::Fri, Weekday::Mon]);
        assert_eq!(mask, 0b0001_0001);
    }

    #[test]
    fn test_parse_shorthands() {
        assert_eq!(RepeatDays::parse("weekdays").unwrap().mask(), WEEKDAYS_MASK);
        assert_eq!(RepeatDays::parse("Sat, sun").unwrap().mask(), WEEKENDS_MASK);
        assert!(RepeatDays::parse("").unwrap().is_empty());
        assert!(RepeatDays::parse("funday").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(RepeatDays::NONE.to_string(), "Once");
        assert_eq!(RepeatDays::from(0b101).to_string(), "Mon, Wed");
    }
}
