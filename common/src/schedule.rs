use chrono::{DateTime, Datelike, Duration, FixedOffset, TimeZone, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::config::ComfortMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    pub fn index(self) -> usize {
        match self {
            Self::Mon => 0,
            Self::Tue => 1,
            Self::Wed => 2,
            Self::Thu => 3,
            Self::Fri => 4,
            Self::Sat => 5,
            Self::Sun => 6,
        }
    }

    pub fn from_index(index: usize) -> Self {
        match index % 7 {
            0 => Self::Mon,
            1 => Self::Tue,
            2 => Self::Wed,
            3 => Self::Thu,
            4 => Self::Fri,
            5 => Self::Sat,
            _ => Self::Sun,
        }
    }

    pub fn from_chrono(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => Self::Mon,
            Weekday::Tue => Self::Tue,
            Weekday::Wed => Self::Wed,
            Weekday::Thu => Self::Thu,
            Weekday::Fri => Self::Fri,
            Weekday::Sat => Self::Sat,
            Weekday::Sun => Self::Sun,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub day: DayOfWeek,
    #[serde(rename = "startMinutes")]
    pub start_minutes: u16,
    pub comfort: ComfortMode,
}

impl ScheduleEntry {
    pub fn validate(&self) -> bool {
        self.start_minutes < 24 * 60
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    pub enabled: bool,
    pub entries: Vec<ScheduleEntry>,
}

impl Default for Schedule {
    fn default() -> Self {
        // Sun through Thu are "work night" days with an early wake block;
        // Fri and Sat run the late pattern.
        let mut entries = Vec::new();
        for day in [
            DayOfWeek::Sun,
            DayOfWeek::Mon,
            DayOfWeek::Tue,
            DayOfWeek::Wed,
            DayOfWeek::Thu,
        ] {
            entries.push(ScheduleEntry {
                day,
                start_minutes: 6 * 60,
                comfort: ComfortMode::Home,
            });
            entries.push(ScheduleEntry {
                day,
                start_minutes: 8 * 60,
                comfort: ComfortMode::Away,
            });
            entries.push(ScheduleEntry {
                day,
                start_minutes: 17 * 60,
                comfort: ComfortMode::Home,
            });
            entries.push(ScheduleEntry {
                day,
                start_minutes: 22 * 60,
                comfort: ComfortMode::Sleep,
            });
        }
        for day in [DayOfWeek::Fri, DayOfWeek::Sat] {
            entries.push(ScheduleEntry {
                day,
                start_minutes: 8 * 60,
                comfort: ComfortMode::Home,
            });
            entries.push(ScheduleEntry {
                day,
                start_minutes: 22 * 60,
                comfort: ComfortMode::Sleep,
            });
        }

        let mut schedule = Self {
            enabled: true,
            entries,
        };
        schedule.normalize();
        schedule
    }
}

impl Schedule {
    pub fn normalize(&mut self) {
        self.entries.retain(ScheduleEntry::validate);
        self.entries
            .sort_by_key(|entry| (entry.day.index(), entry.start_minutes));
    }

    /// Active comfort profile: most recent entry at or before now, walking
    /// back through previous days when today has none yet. Home when the
    /// schedule is disabled or empty.
    pub fn current_comfort(&self, now: DateTime<FixedOffset>) -> ComfortMode {
        if !self.enabled || self.entries.is_empty() {
            return ComfortMode::Home;
        }

        let day = DayOfWeek::from_chrono(now.weekday());
        let current_minutes = now.hour() as u16 * 60 + now.minute() as u16;

        let mut best: Option<&ScheduleEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.day == day && entry.start_minutes <= current_minutes)
            .max_by_key(|entry| entry.start_minutes);

        if best.is_none() {
            for i in 1..=7 {
                let candidate_day = DayOfWeek::from_index((day.index() + 7 - i) % 7);
                best = self
                    .entries
                    .iter()
                    .filter(|entry| entry.day == candidate_day)
                    .max_by_key(|entry| entry.start_minutes);

                if best.is_some() {
                    break;
                }
            }
        }

        best.map(|entry| entry.comfort).unwrap_or(ComfortMode::Home)
    }

    pub fn next_event_epoch(&self, now: DateTime<FixedOffset>) -> Option<i64> {
        if !self.enabled || self.entries.is_empty() {
            return None;
        }

        let now_day = DayOfWeek::from_chrono(now.weekday());
        let now_minute = now.hour() as i64 * 60 + now.minute() as i64;

        let mut best: Option<DateTime<FixedOffset>> = None;

        // Offset 7 covers wrap-around to the same weekday next week when
        // every remaining entry today is already behind us.
        for day_offset in 0..=7i64 {
            let day = DayOfWeek::from_index((now_day.index() + day_offset as usize) % 7);
            for entry in self.entries.iter().filter(|entry| entry.day == day) {
                let candidate_minutes = entry.start_minutes as i64;
                if day_offset == 0 && candidate_minutes <= now_minute {
                    continue;
                }

                let date = now.date_naive() + Duration::days(day_offset);
                let hour = (entry.start_minutes / 60) as u32;
                let minute = (entry.start_minutes % 60) as u32;

                let Some(naive) = date.and_hms_opt(hour, minute, 0) else {
                    continue;
                };

                let Some(candidate) = now.offset().from_local_datetime(&naive).single() else {
                    continue;
                };

                if best.map(|current| candidate < current).unwrap_or(true) {
                    best = Some(candidate);
                }
            }
        }

        best.map(|dt| dt.timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 1, day, hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn default_table_resolves_work_morning() {
        let schedule = Schedule::default();

        // Jan 5, 2026 is a Monday.
        assert_eq!(
            schedule.current_comfort(fixed_time(5, 7, 0)),
            ComfortMode::Home
        );
        assert_eq!(
            schedule.current_comfort(fixed_time(5, 9, 30)),
            ComfortMode::Away
        );
        assert_eq!(
            schedule.current_comfort(fixed_time(5, 23, 0)),
            ComfortMode::Sleep
        );
    }

    #[test]
    fn early_saturday_still_runs_friday_night_block() {
        let schedule = Schedule::default();

        // Jan 10, 2026 is a Saturday; before its first entry the active
        // profile is Friday's 22:00 sleep block.
        assert_eq!(
            schedule.current_comfort(fixed_time(10, 7, 0)),
            ComfortMode::Sleep
        );
        assert_eq!(
            schedule.current_comfort(fixed_time(10, 8, 0)),
            ComfortMode::Home
        );
    }

    #[test]
    fn wraps_to_previous_day_with_sparse_entries() {
        let mut schedule = Schedule {
            enabled: true,
            entries: vec![ScheduleEntry {
                day: DayOfWeek::Sun,
                start_minutes: 23 * 60,
                comfort: ComfortMode::Sleep,
            }],
        };
        schedule.normalize();

        let now = fixed_time(5, 8, 0);
        assert_eq!(schedule.current_comfort(now), ComfortMode::Sleep);
    }

    #[test]
    fn disabled_schedule_resolves_home() {
        let mut schedule = Schedule::default();
        schedule.enabled = false;

        assert_eq!(
            schedule.current_comfort(fixed_time(5, 9, 30)),
            ComfortMode::Home
        );
        assert_eq!(schedule.next_event_epoch(fixed_time(5, 9, 30)), None);
    }

    #[test]
    fn finds_next_event_in_current_week() {
        let mut schedule = Schedule {
            enabled: true,
            entries: vec![
                ScheduleEntry {
                    day: DayOfWeek::Mon,
                    start_minutes: 9 * 60,
                    comfort: ComfortMode::Away,
                },
                ScheduleEntry {
                    day: DayOfWeek::Mon,
                    start_minutes: 18 * 60,
                    comfort: ComfortMode::Home,
                },
            ],
        };
        schedule.normalize();

        let now = fixed_time(5, 9, 1);
        let next = schedule.next_event_epoch(now).unwrap();
        let expected = fixed_time(5, 18, 0).timestamp();

        assert_eq!(next, expected);
    }

    #[test]
    fn next_event_wraps_to_the_same_day_next_week() {
        let mut schedule = Schedule {
            enabled: true,
            entries: vec![ScheduleEntry {
                day: DayOfWeek::Mon,
                start_minutes: 9 * 60,
                comfort: ComfortMode::Away,
            }],
        };
        schedule.normalize();

        // Monday at 10:00, past the only entry of the week.
        let now = fixed_time(5, 10, 0);
        let next = schedule.next_event_epoch(now).unwrap();
        let expected = fixed_time(12, 9, 0).timestamp();

        assert_eq!(next, expected);
    }

    #[test]
    fn normalize_drops_invalid_times_and_sorts() {
        let mut schedule = Schedule {
            enabled: true,
            entries: vec![
                ScheduleEntry {
                    day: DayOfWeek::Mon,
                    start_minutes: 25 * 60,
                    comfort: ComfortMode::Home,
                },
                ScheduleEntry {
                    day: DayOfWeek::Mon,
                    start_minutes: 17 * 60,
                    comfort: ComfortMode::Home,
                },
                ScheduleEntry {
                    day: DayOfWeek::Mon,
                    start_minutes: 6 * 60,
                    comfort: ComfortMode::Home,
                },
            ],
        };
        schedule.normalize();

        assert_eq!(schedule.entries.len(), 2);
        assert_eq!(schedule.entries[0].start_minutes, 6 * 60);
        assert_eq!(schedule.entries[1].start_minutes, 17 * 60);
    }
}
