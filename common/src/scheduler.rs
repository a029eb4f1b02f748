use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Utc};
use serde::Serialize;

use crate::calendar::{CalendarDay, ClockTime, DayOfWeek, WeekCalendar};
use crate::types::{ExternalControl, Offset, Setpoint, ThermostatState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModeSource {
    ExternalControl,
    Boost,
    Vacation,
    Calendar {
        day: DayOfWeek,
        /// Program slot in effect, `None` between programs.
        slot: Option<usize>,
    },
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulerEvent {
    BoostExpired,
    VacationStarted,
    VacationEnded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub source: ModeSource,
    /// `None` while the device has not reported a base target yet.
    pub target: Option<Setpoint>,
    pub events: Vec<SchedulerEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostState {
    pub enabled: bool,
    pub duration_minutes: u16,
    pub offset: Offset,
    remaining_secs: i64,
    #[serde(skip)]
    evaluated_at: Option<DateTime<Utc>>,
}

impl BoostState {
    pub fn start(duration_minutes: u16, offset: Offset, now: DateTime<Utc>) -> Self {
        Self {
            enabled: duration_minutes > 0,
            duration_minutes,
            offset,
            remaining_secs: duration_minutes as i64 * 60,
            evaluated_at: Some(now),
        }
    }

    /// Configured but not running.
    pub fn idle(duration_minutes: u16, offset: Offset) -> Self {
        Self {
            duration_minutes,
            offset,
            ..Self::default()
        }
    }

    /// Boost state as reported by the device. The device counts in whole
    /// minutes, so its figure only replaces ours when they differ by a minute
    /// or more.
    pub fn sync_remaining(&mut self, enabled: bool, remaining_minutes: u16, now: DateTime<Utc>) {
        if !enabled || remaining_minutes == 0 {
            self.enabled = false;
            self.remaining_secs = 0;
        } else {
            let reported = remaining_minutes as i64 * 60;
            if !self.enabled || (reported - self.remaining_secs).abs() >= 60 {
                self.remaining_secs = reported;
            }
            self.enabled = true;
        }
        self.evaluated_at = Some(now);
    }

    pub fn is_active(&self) -> bool {
        self.enabled && self.remaining_secs > 0
    }

    pub fn remaining(&self) -> Duration {
        Duration::seconds(self.remaining_secs.max(0))
    }

    /// Remaining whole minutes, rounded up.
    pub fn remaining_minutes(&self) -> u32 {
        ((self.remaining_secs.max(0) + 59) / 60) as u32
    }

    /// Counts down by the time elapsed since the previous call. Returns `true`
    /// when the boost ran out during this call.
    fn advance(&mut self, now: DateTime<Utc>) -> bool {
        let elapsed = self
            .evaluated_at
            .map(|last| (now - last).num_seconds().max(0))
            .unwrap_or(0);
        self.evaluated_at = Some(now);

        if !self.enabled {
            return false;
        }
        self.remaining_secs = self.remaining_secs.saturating_sub(elapsed);
        if self.remaining_secs <= 0 {
            self.enabled = false;
            self.remaining_secs = 0;
            return true;
        }
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VacationState {
    pub enabled: bool,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub offset: Offset,
    active: bool,
}

impl VacationState {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, offset: Offset, enabled: bool) -> Self {
        Self {
            enabled,
            start,
            end,
            offset,
            active: false,
        }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.start <= now && now < self.end
    }

    /// Active as of the last evaluation.
    pub fn is_active(&self) -> bool {
        self.active
    }

    fn advance(&mut self, now: DateTime<Utc>) -> Option<SchedulerEvent> {
        let was_active = self.active;
        self.active = self.is_active_at(now);
        if self.enabled && now >= self.end {
            self.enabled = false;
        }

        match (was_active, self.active) {
            (false, true) => Some(SchedulerEvent::VacationStarted),
            (true, false) => Some(SchedulerEvent::VacationEnded),
            _ => None,
        }
    }
}

/// Decides which mode drives the target. Precedence is external control,
/// boost, vacation, calendar, then the manual target.
#[derive(Debug, Clone, Default)]
pub struct ModeScheduler {
    boost: BoostState,
    vacation: Option<VacationState>,
    calendar_enabled: bool,
    calendar: WeekCalendar,
    external_control: ExternalControl,
}

impl ModeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boost(&self) -> &BoostState {
        &self.boost
    }

    pub fn set_boost(&mut self, boost: BoostState) {
        self.boost = boost;
    }

    pub fn boost_mut(&mut self) -> &mut BoostState {
        &mut self.boost
    }

    pub fn vacation(&self) -> Option<&VacationState> {
        self.vacation.as_ref()
    }

    pub fn set_vacation(&mut self, vacation: Option<VacationState>) {
        self.vacation = vacation;
    }

    pub fn calendar_enabled(&self) -> bool {
        self.calendar_enabled
    }

    pub fn set_calendar_enabled(&mut self, enabled: bool) {
        self.calendar_enabled = enabled;
    }

    pub fn calendar(&self) -> &WeekCalendar {
        &self.calendar
    }

    pub fn set_calendar_day(&mut self, day: CalendarDay) {
        self.calendar.set(day);
    }

    pub fn external_control(&self) -> ExternalControl {
        self.external_control
    }

    pub fn set_external_control(&mut self, control: ExternalControl) {
        self.external_control = control;
    }

    pub fn tick(
        &mut self,
        now: DateTime<Utc>,
        local: NaiveDateTime,
        thermostat: &ThermostatState,
    ) -> Evaluation {
        let mut events = Vec::new();

        if self.boost.advance(now) {
            events.push(SchedulerEvent::BoostExpired);
        }
        if let Some(event) = self.vacation.as_mut().and_then(|v| v.advance(now)) {
            events.push(event);
        }

        let (source, target) = self.resolve(now, local, thermostat);
        Evaluation {
            source,
            target,
            events,
        }
    }

    fn resolve(
        &self,
        now: DateTime<Utc>,
        local: NaiveDateTime,
        thermostat: &ThermostatState,
    ) -> (ModeSource, Option<Setpoint>) {
        let base = thermostat.base_setpoint();

        match self.external_control {
            ExternalControl::Temperature(target) => {
                return (ModeSource::ExternalControl, Some(Setpoint::Temperature(target)));
            }
            ExternalControl::TemperatureChange(change) => {
                let target = base.map(|b| b.apply(Offset::temperature(change)));
                return (ModeSource::ExternalControl, target);
            }
            ExternalControl::Off => {}
        }

        if self.boost.is_active() {
            return (ModeSource::Boost, base.map(|b| b.apply(self.boost.offset)));
        }

        if let Some(vacation) = self.vacation.filter(|v| v.is_active_at(now)) {
            return (ModeSource::Vacation, base.map(|b| b.apply(vacation.offset)));
        }

        if self.calendar_enabled {
            let day = DayOfWeek::from_chrono(local.weekday());
            let time = ClockTime::from_naive(local.time());
            let program = self
                .calendar
                .get(day)
                .and_then(|calendar| calendar.active_program(time));

            return match program {
                Some((slot, program)) => (
                    ModeSource::Calendar {
                        day,
                        slot: Some(slot),
                    },
                    base.map(|b| b.apply(program.offset)),
                ),
                None => (ModeSource::Calendar { day, slot: None }, base),
            };
        }

        (ModeSource::Manual, base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CalendarProgram;
    use crate::types::HeatingMode;
    use chrono::{NaiveDate, TimeZone};
    use pretty_assertions::assert_eq;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn local_of(now: DateTime<Utc>) -> NaiveDateTime {
        now.naive_utc() + Duration::hours(2)
    }

    fn room_at(target: f32) -> ThermostatState {
        ThermostatState {
            heating_mode: Some(HeatingMode::Room),
            target_temperature: Some(target),
            ..ThermostatState::default()
        }
    }

    fn tick(scheduler: &mut ModeScheduler, now: DateTime<Utc>, state: &ThermostatState) -> Evaluation {
        scheduler.tick(now, local_of(now), state)
    }

    #[test]
    fn boost_expires_after_its_duration() {
        let start = utc(2025, 1, 10, 12, 0);
        let state = room_at(21.0);
        let mut scheduler = ModeScheduler::new();
        scheduler.set_boost(BoostState::start(30, Offset::temperature(2.0), start));
        assert_eq!(scheduler.boost().remaining_minutes(), 30);

        let first = tick(&mut scheduler, start, &state);
        assert_eq!(first.source, ModeSource::Boost);
        assert_eq!(scheduler.boost().remaining_minutes(), 30);

        let during = tick(&mut scheduler, start + Duration::minutes(10), &state);
        assert_eq!(during.source, ModeSource::Boost);
        assert_eq!(during.target, Some(Setpoint::Temperature(23.0)));
        assert_eq!(scheduler.boost().remaining_minutes(), 20);

        let after = tick(&mut scheduler, start + Duration::minutes(31), &state);
        assert_eq!(after.events, vec![SchedulerEvent::BoostExpired]);
        assert_eq!(after.source, ModeSource::Manual);
        assert!(!scheduler.boost().enabled);
        assert_eq!(scheduler.boost().remaining(), Duration::zero());
    }

    #[test]
    fn boost_countdown_is_independent_of_tick_spacing() {
        let start = utc(2025, 1, 10, 12, 0);
        let state = room_at(21.0);
        let mut scheduler = ModeScheduler::new();
        scheduler.set_boost(BoostState::start(30, Offset::temperature(1.0), start));

        let mut now = start;
        for step in [1, 59, 7, 300, 13, 600, 1] {
            now += Duration::seconds(step);
            let evaluation = tick(&mut scheduler, now, &state);
            assert!(evaluation.events.is_empty());
        }
        let elapsed = (now - start).num_seconds();
        assert_eq!(scheduler.boost().remaining().num_seconds(), 1800 - elapsed);
    }

    #[test]
    fn device_report_resyncs_boost_countdown() {
        let start = utc(2025, 1, 10, 12, 0);
        let mut boost = BoostState::start(60, Offset::temperature(1.0), start);
        // Same whole minute as our own countdown: keep ours.
        boost.sync_remaining(true, 60, start + Duration::seconds(30));
        assert_eq!(boost.remaining().num_seconds(), 3600);

        boost.sync_remaining(true, 45, start + Duration::seconds(40));
        assert_eq!(boost.remaining_minutes(), 45);

        boost.sync_remaining(false, 0, start + Duration::seconds(50));
        assert!(!boost.is_active());
    }

    #[test]
    fn vacation_window_edges() {
        let mut scheduler = ModeScheduler::new();
        scheduler.set_vacation(Some(VacationState::new(
            utc(2025, 1, 10, 0, 0),
            utc(2025, 1, 15, 0, 0),
            Offset::temperature(-4.0),
            true,
        )));
        let state = room_at(21.0);

        let before = tick(&mut scheduler, utc(2025, 1, 9, 23, 59), &state);
        assert_eq!(before.source, ModeSource::Manual);

        let at_start = tick(&mut scheduler, utc(2025, 1, 10, 0, 0), &state);
        assert_eq!(at_start.source, ModeSource::Vacation);
        assert_eq!(at_start.target, Some(Setpoint::Temperature(17.0)));
        assert_eq!(at_start.events, vec![SchedulerEvent::VacationStarted]);
        assert!(scheduler.vacation().unwrap().is_active());

        let during = tick(&mut scheduler, utc(2025, 1, 12, 0, 0), &state);
        assert_eq!(during.source, ModeSource::Vacation);
        assert!(during.events.is_empty());

        let after = tick(&mut scheduler, utc(2025, 1, 16, 0, 0), &state);
        assert_eq!(after.source, ModeSource::Manual);
        assert_eq!(after.events, vec![SchedulerEvent::VacationEnded]);
        let vacation = scheduler.vacation().unwrap();
        assert!(!vacation.enabled);
        assert!(!vacation.is_active());
    }

    #[test]
    fn vacation_end_is_exclusive() {
        let end = utc(2025, 1, 15, 0, 0);
        let vacation = VacationState::new(utc(2025, 1, 10, 0, 0), end, Offset::default(), true);
        assert!(vacation.is_active_at(end - Duration::seconds(1)));
        assert!(!vacation.is_active_at(end));
    }

    #[test]
    fn external_control_beats_boost() {
        let now = utc(2025, 1, 10, 12, 0);
        let mut scheduler = ModeScheduler::new();
        scheduler.set_boost(BoostState::start(30, Offset::temperature(2.0), now));
        scheduler.set_external_control(ExternalControl::Temperature(18.0));

        let evaluation = tick(&mut scheduler, now, &room_at(21.0));
        assert_eq!(evaluation.source, ModeSource::ExternalControl);
        assert_eq!(evaluation.target, Some(Setpoint::Temperature(18.0)));

        scheduler.set_external_control(ExternalControl::TemperatureChange(-1.5));
        let relative = tick(&mut scheduler, now, &room_at(21.0));
        assert_eq!(relative.target, Some(Setpoint::Temperature(19.5)));
    }

    #[test]
    fn boost_beats_vacation() {
        let now = utc(2025, 1, 12, 12, 0);
        let mut scheduler = ModeScheduler::new();
        scheduler.set_vacation(Some(VacationState::new(
            utc(2025, 1, 10, 0, 0),
            utc(2025, 1, 15, 0, 0),
            Offset::temperature(-4.0),
            true,
        )));
        scheduler.set_boost(BoostState::start(30, Offset::temperature(2.0), now));

        let evaluation = tick(&mut scheduler, now, &room_at(21.0));
        assert_eq!(evaluation.source, ModeSource::Boost);
    }

    #[test]
    fn calendar_uses_local_weekday_and_time() {
        // 2025-01-12 is a Sunday; 22:30 UTC is already Monday 00:30 at UTC+2.
        let now = utc(2025, 1, 12, 22, 30);
        let mut scheduler = ModeScheduler::new();
        scheduler.set_calendar_enabled(true);

        let mut monday = CalendarDay::empty(DayOfWeek::Mon);
        monday.programs[2] = CalendarProgram {
            start: ClockTime::new(0, 0),
            end: ClockTime::new(6, 0),
            offset: Offset::temperature(-2.0),
            enabled: true,
        };
        scheduler.set_calendar_day(monday);

        let evaluation = tick(&mut scheduler, now, &room_at(21.0));
        assert_eq!(
            evaluation.source,
            ModeSource::Calendar {
                day: DayOfWeek::Mon,
                slot: Some(2)
            }
        );
        assert_eq!(evaluation.target, Some(Setpoint::Temperature(19.0)));

        let later = tick(&mut scheduler, now + Duration::hours(6), &room_at(21.0));
        assert_eq!(
            later.source,
            ModeSource::Calendar {
                day: DayOfWeek::Mon,
                slot: None
            }
        );
        assert_eq!(later.target, Some(Setpoint::Temperature(21.0)));
    }

    #[test]
    fn power_mode_applies_percent_offsets() {
        let now = utc(2025, 1, 10, 12, 0);
        let state = ThermostatState {
            heating_mode: Some(HeatingMode::Power),
            target_power: Some(80),
            ..ThermostatState::default()
        };
        let mut scheduler = ModeScheduler::new();
        scheduler.set_boost(BoostState::start(
            30,
            Offset {
                temperature: 2.0,
                power: 40,
            },
            now,
        ));

        let evaluation = tick(&mut scheduler, now, &state);
        assert_eq!(evaluation.target, Some(Setpoint::Power(100)));
    }

    #[test]
    fn unknown_base_target_yields_no_setpoint() {
        let now = utc(2025, 1, 10, 12, 0);
        let mut scheduler = ModeScheduler::new();
        let evaluation = tick(&mut scheduler, now, &ThermostatState::default());
        assert_eq!(evaluation.source, ModeSource::Manual);
        assert_eq!(evaluation.target, None);
        assert_eq!(
            local_of(now),
            NaiveDate::from_ymd_opt(2025, 1, 10).unwrap().and_hms_opt(14, 0, 0).unwrap()
        );
    }
}
