//! UTC to device wall-clock conversion.
//!
//! The thermostat keeps local wall-clock time and applies daylight saving on
//! its own when its daylight-saving flag is set. [`TimeConverter`] mirrors that
//! so the host can translate timestamps both ways and detect clock drift.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::codec::DaylightSaving;

/// Drift beyond this many seconds marks the device clock as out of sync.
pub const MAX_CLOCK_DRIFT_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstPolicy {
    /// Summer time from the last Sunday of March 01:00 UTC to the last Sunday
    /// of October 01:00 UTC.
    EuropeanUnion {
        standard_offset_minutes: i32,
        shift_minutes: i32,
    },
    /// Transitions taken from the IANA database.
    Zone(Tz),
}

impl DstPolicy {
    pub fn standard_offset_minutes(&self, utc: DateTime<Utc>) -> i32 {
        match *self {
            Self::EuropeanUnion {
                standard_offset_minutes,
                ..
            } => standard_offset_minutes,
            Self::Zone(tz) => {
                // Southern zones observe summer time in January.
                let year = utc.year();
                [(1, 15), (7, 15)]
                    .into_iter()
                    .filter_map(|(month, day)| NaiveDate::from_ymd_opt(year, month, day))
                    .filter_map(|date| date.and_hms_opt(12, 0, 0))
                    .map(|naive| zone_offset_minutes(tz, Utc.from_utc_datetime(&naive)))
                    .min()
                    .unwrap_or_else(|| zone_offset_minutes(tz, utc))
            }
        }
    }

    /// Offset from UTC in effect at `utc` when daylight saving is observed.
    pub fn observed_offset_minutes(&self, utc: DateTime<Utc>) -> i32 {
        match *self {
            Self::EuropeanUnion {
                standard_offset_minutes,
                shift_minutes,
            } => {
                if eu_summer_time(utc) {
                    standard_offset_minutes + shift_minutes
                } else {
                    standard_offset_minutes
                }
            }
            Self::Zone(tz) => zone_offset_minutes(tz, utc),
        }
    }
}

fn zone_offset_minutes(tz: Tz, utc: DateTime<Utc>) -> i32 {
    tz.offset_from_utc_datetime(&utc.naive_utc())
        .fix()
        .local_minus_utc()
        / 60
}

fn last_sunday_at_one_utc(year: i32, month: u32) -> Option<NaiveDateTime> {
    // March and October both have 31 days.
    let last = NaiveDate::from_ymd_opt(year, month, 31)?;
    let sunday = last - Duration::days(last.weekday().num_days_from_sunday() as i64);
    sunday.and_hms_opt(1, 0, 0)
}

fn eu_summer_time(utc: DateTime<Utc>) -> bool {
    let year = utc.year();
    match (
        last_sunday_at_one_utc(year, 3),
        last_sunday_at_one_utc(year, 10),
    ) {
        (Some(start), Some(end)) => {
            let at = utc.naive_utc();
            at >= start && at < end
        }
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockStatus {
    pub device_time: NaiveDateTime,
    pub expected_time: NaiveDateTime,
    pub drift_seconds: i64,
    pub in_sync: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeConverter {
    policy: DstPolicy,
}

impl TimeConverter {
    pub fn new(policy: DstPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DstPolicy {
        self.policy
    }

    pub fn offset_minutes(&self, utc: DateTime<Utc>, dst_enabled: bool) -> i32 {
        if dst_enabled {
            self.policy.observed_offset_minutes(utc)
        } else {
            self.policy.standard_offset_minutes(utc)
        }
    }

    pub fn to_device_time(&self, utc: DateTime<Utc>, dst_enabled: bool) -> NaiveDateTime {
        let offset = self.offset_minutes(utc, dst_enabled);
        utc.naive_utc() + Duration::minutes(offset as i64)
    }

    /// Interprets a device wall-clock time. Repeated local times at the end of
    /// summer resolve to the later (standard time) instant; skipped local times
    /// at the start of summer are shifted forward.
    pub fn to_utc(&self, local: NaiveDateTime, dst_enabled: bool) -> DateTime<Utc> {
        let as_utc = |offset: i32| Utc.from_utc_datetime(&(local - Duration::minutes(offset as i64)));

        let standard = self.policy.standard_offset_minutes(as_utc(0));
        let guess = as_utc(standard);
        if !dst_enabled {
            return guess;
        }

        let offset = self.offset_minutes(guess, true);
        let candidate = as_utc(offset);
        let confirmed = self.offset_minutes(candidate, true);
        if confirmed == offset {
            candidate
        } else {
            as_utc(confirmed)
        }
    }

    pub fn drift_seconds(
        &self,
        device_local: NaiveDateTime,
        utc_now: DateTime<Utc>,
        dst_enabled: bool,
    ) -> i64 {
        (device_local - self.to_device_time(utc_now, dst_enabled)).num_seconds()
    }

    pub fn clock_status(
        &self,
        device_local: NaiveDateTime,
        utc_now: DateTime<Utc>,
        dst_enabled: bool,
    ) -> ClockStatus {
        let expected_time = self.to_device_time(utc_now, dst_enabled);
        let drift_seconds = (device_local - expected_time).num_seconds();
        ClockStatus {
            device_time: device_local,
            expected_time,
            drift_seconds,
            in_sync: drift_seconds.abs() <= MAX_CLOCK_DRIFT_SECS,
        }
    }

    /// Daylight-saving characteristic matching this converter: base offset
    /// plus symmetric shifts.
    pub fn daylight_saving(&self, utc_now: DateTime<Utc>, dst_enabled: bool) -> DaylightSaving {
        let standard = self.policy.standard_offset_minutes(utc_now);
        let shift = match self.policy {
            DstPolicy::EuropeanUnion { shift_minutes, .. } => shift_minutes,
            DstPolicy::Zone(_) => {
                let year_max = [(1, 15), (7, 15)]
                    .into_iter()
                    .filter_map(|(month, day)| NaiveDate::from_ymd_opt(utc_now.year(), month, day))
                    .filter_map(|date| date.and_hms_opt(12, 0, 0))
                    .map(|naive| self.policy.observed_offset_minutes(Utc.from_utc_datetime(&naive)))
                    .max()
                    .unwrap_or(standard);
                year_max - standard
            }
        };
        DaylightSaving {
            enabled: dst_enabled,
            winter_to_summer_minutes: shift as i16,
            summer_to_winter_minutes: shift as i16,
            timezone_offset_minutes: standard as i16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn helsinki_eu() -> TimeConverter {
        TimeConverter::new(DstPolicy::EuropeanUnion {
            standard_offset_minutes: 120,
            shift_minutes: 60,
        })
    }

    #[test]
    fn winter_and_summer_offsets() {
        let converter = helsinki_eu();
        assert_eq!(
            converter.to_device_time(utc(2025, 1, 10, 12, 0), true),
            local(2025, 1, 10, 14, 0)
        );
        assert_eq!(
            converter.to_device_time(utc(2025, 7, 1, 12, 0), true),
            local(2025, 7, 1, 15, 0)
        );
        assert_eq!(
            converter.to_device_time(utc(2025, 7, 1, 12, 0), false),
            local(2025, 7, 1, 14, 0)
        );
    }

    #[test]
    fn eu_transitions_happen_at_one_utc() {
        let converter = helsinki_eu();
        assert_eq!(converter.offset_minutes(utc(2025, 3, 30, 0, 59), true), 120);
        assert_eq!(converter.offset_minutes(utc(2025, 3, 30, 1, 0), true), 180);
        assert_eq!(converter.offset_minutes(utc(2025, 10, 26, 0, 59), true), 180);
        assert_eq!(converter.offset_minutes(utc(2025, 10, 26, 1, 0), true), 120);
    }

    #[test]
    fn zone_policy_agrees_with_eu_rule() {
        let zone = TimeConverter::new(DstPolicy::Zone(chrono_tz::Europe::Helsinki));
        let eu = helsinki_eu();
        for instant in [
            utc(2025, 1, 10, 12, 0),
            utc(2025, 3, 30, 0, 59),
            utc(2025, 3, 30, 1, 0),
            utc(2025, 8, 15, 23, 30),
            utc(2025, 10, 26, 1, 0),
        ] {
            assert_eq!(
                zone.to_device_time(instant, true),
                eu.to_device_time(instant, true)
            );
        }
    }

    #[test]
    fn southern_zone_standard_offset_is_winter_offset() {
        let sydney = DstPolicy::Zone(chrono_tz::Australia::Sydney);
        assert_eq!(sydney.standard_offset_minutes(utc(2025, 1, 10, 0, 0)), 600);
        assert_eq!(sydney.observed_offset_minutes(utc(2025, 1, 10, 0, 0)), 660);
    }

    #[test]
    fn to_utc_inverts_to_device_time() {
        let converter = helsinki_eu();
        for instant in [
            utc(2025, 1, 10, 0, 0),
            utc(2025, 3, 30, 2, 0),
            utc(2025, 6, 1, 21, 15),
            utc(2025, 10, 26, 2, 0),
        ] {
            for dst in [true, false] {
                let device = converter.to_device_time(instant, dst);
                assert_eq!(converter.to_utc(device, dst), instant);
            }
        }
    }

    #[test]
    fn repeated_and_skipped_local_times() {
        let converter = helsinki_eu();
        // 03:30 happens twice on 2025-10-26 in Helsinki.
        assert_eq!(
            converter.to_utc(local(2025, 10, 26, 3, 30), true),
            utc(2025, 10, 26, 1, 30)
        );
        // 03:30 never happens on 2025-03-30.
        assert_eq!(
            converter.to_utc(local(2025, 3, 30, 3, 30), true),
            utc(2025, 3, 30, 1, 30)
        );
    }

    #[test]
    fn drift_threshold_is_sixty_seconds() {
        let converter = helsinki_eu();
        let now = utc(2025, 1, 10, 8, 0);

        let ahead = converter.clock_status(local(2025, 1, 10, 10, 1) + Duration::seconds(30), now, true);
        assert_eq!(ahead.drift_seconds, 90);
        assert!(!ahead.in_sync);

        let close = converter.clock_status(local(2025, 1, 10, 9, 59) + Duration::seconds(15), now, true);
        assert_eq!(close.drift_seconds, -45);
        assert!(close.in_sync);
        assert_eq!(converter.drift_seconds(local(2025, 1, 10, 10, 0), now, true), 0);
    }

    #[test]
    fn daylight_saving_characteristic_uses_base_offset() {
        let config = helsinki_eu().daylight_saving(utc(2025, 7, 1, 12, 0), true);
        assert_eq!(
            config,
            DaylightSaving {
                enabled: true,
                winter_to_summer_minutes: 60,
                summer_to_winter_minutes: 60,
                timezone_offset_minutes: 120,
            }
        );

        let zone = TimeConverter::new(DstPolicy::Zone(chrono_tz::Europe::Berlin))
            .daylight_saving(utc(2025, 7, 1, 12, 0), false);
        assert_eq!(zone.timezone_offset_minutes, 60);
        assert_eq!(zone.winter_to_summer_minutes, 60);
        assert!(!zone.enabled);
    }
}
