use std::fmt;

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use crate::characteristics::Field;
use crate::codec::{check_offset, offset_at, put_offset};
use crate::error::{EnstoError, Result};
use crate::types::{HeatingMode, Offset};

pub const PROGRAMS_PER_DAY: usize = 6;
const PROGRAM_LEN: usize = 8;
const DAY_LEN: usize = 1 + PROGRAMS_PER_DAY * PROGRAM_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
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
    pub const ALL: [DayOfWeek; 7] = [
        Self::Mon,
        Self::Tue,
        Self::Wed,
        Self::Thu,
        Self::Fri,
        Self::Sat,
        Self::Sun,
    ];

    /// Device day number, Monday = 1.
    pub fn number(self) -> u8 {
        match self {
            Self::Mon => 1,
            Self::Tue => 2,
            Self::Wed => 3,
            Self::Thu => 4,
            Self::Fri => 5,
            Self::Sat => 6,
            Self::Sun => 7,
        }
    }

    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Self::Mon),
            2 => Some(Self::Tue),
            3 => Some(Self::Wed),
            4 => Some(Self::Thu),
            5 => Some(Self::Fri),
            6 => Some(Self::Sat),
            7 => Some(Self::Sun),
            _ => None,
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

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mon => "MON",
            Self::Tue => "TUE",
            Self::Wed => "WED",
            Self::Thu => "THU",
            Self::Fri => "FRI",
            Self::Sat => "SAT",
            Self::Sun => "SUN",
        }
    }

    fn index(self) -> usize {
        self.number() as usize - 1
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Self {
        Self { hour, minute }
    }

    pub fn from_naive(time: NaiveTime) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    pub fn minutes_of_day(self) -> u16 {
        self.hour as u16 * 60 + self.minute as u16
    }

    fn validate(self) -> Result<()> {
        if self.hour > 23 || self.minute > 59 {
            return Err(EnstoError::validation(
                Field::CalendarDay,
                format!("invalid time of day {self}"),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// One slot of a day calendar. A program covers `[start, end)`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarProgram {
    pub start: ClockTime,
    pub end: ClockTime,
    pub offset: Offset,
    pub enabled: bool,
}

impl CalendarProgram {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn contains(&self, time: ClockTime) -> bool {
        self.enabled && self.start <= time && time < self.end
    }

    fn validate(&self, index: usize, heating_mode: HeatingMode) -> Result<()> {
        let field = Field::CalendarDay;
        self.start.validate()?;
        self.end.validate()?;

        if self.enabled && self.end <= self.start {
            return Err(EnstoError::validation(
                field,
                format!("program {index}: end {} is not after start {}", self.end, self.start),
            ));
        }

        // The offset the heating mode actually uses must be a valid offset;
        // the other one only has to fit its wire field.
        let (min, max, value, unit) = if heating_mode.is_power() {
            (Offset::POWER_MIN as f32, Offset::POWER_MAX as f32, self.offset.power as f32, "%")
        } else {
            (Offset::TEMPERATURE_MIN, Offset::TEMPERATURE_MAX, self.offset.temperature, "°C")
        };
        if value.is_nan() || value < min || value > max {
            return Err(EnstoError::validation(
                field,
                format!("program {index}: offset {value}{unit} outside {min}..={max}"),
            ));
        }
        check_offset(field, self.offset)
    }
}

/// Disabled programs carry no meaning beyond being disabled, so they compare
/// equal whatever their remaining fields hold.
impl PartialEq for CalendarProgram {
    fn eq(&self, other: &Self) -> bool {
        match (self.enabled, other.enabled) {
            (false, false) => true,
            (true, true) => {
                self.start == other.start && self.end == other.end && self.offset == other.offset
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDay {
    pub day: DayOfWeek,
    pub programs: [CalendarProgram; PROGRAMS_PER_DAY],
}

impl CalendarDay {
    pub fn empty(day: DayOfWeek) -> Self {
        Self {
            day,
            programs: [CalendarProgram::disabled(); PROGRAMS_PER_DAY],
        }
    }

    /// Program driving the target at `time`. Overlaps resolve to the highest slot.
    pub fn active_program(&self, time: ClockTime) -> Option<(usize, &CalendarProgram)> {
        self.programs
            .iter()
            .enumerate()
            .rev()
            .find(|(_, program)| program.contains(time))
    }

    /// Pairs of enabled slots whose time ranges intersect.
    pub fn overlaps(&self) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (i, a) in self.programs.iter().enumerate() {
            for (j, b) in self.programs.iter().enumerate().skip(i + 1) {
                if a.enabled && b.enabled && a.start < b.end && b.start < a.end {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }
}

/// Builds and encodes a day from up to six programs.
pub fn encode_day(
    day: DayOfWeek,
    programs: &[CalendarProgram],
    heating_mode: HeatingMode,
) -> Result<Vec<u8>> {
    if programs.len() > PROGRAMS_PER_DAY {
        return Err(EnstoError::validation(
            Field::CalendarDay,
            format!(
                "{} programs given, a day holds at most {PROGRAMS_PER_DAY}",
                programs.len()
            ),
        ));
    }
    let mut slots = [CalendarProgram::disabled(); PROGRAMS_PER_DAY];
    slots[..programs.len()].copy_from_slice(programs);
    CalendarDay {
        day,
        programs: slots,
    }
    .encode(heating_mode)
}

impl CalendarDay {
    pub fn encode(&self, heating_mode: HeatingMode) -> Result<Vec<u8>> {
        let field = Field::CalendarDay;
        let mut out = Vec::with_capacity(DAY_LEN);
        out.push(self.day.number());

        for (index, program) in self.programs.iter().enumerate() {
            if !program.enabled {
                out.extend_from_slice(&[0; PROGRAM_LEN]);
                continue;
            }
            program.validate(index, heating_mode)?;
            out.extend_from_slice(&[
                program.start.hour,
                program.start.minute,
                program.end.hour,
                program.end.minute,
            ]);
            put_offset(&mut out, field, program.offset)?;
            out.push(1);
        }
        Ok(out)
    }

    /// Decodes a reassembled day. Trailing zero padding is accepted and a
    /// payload cut short by stripped padding is zero-extended.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let field = Field::CalendarDay;
        if bytes.is_empty() {
            return Err(EnstoError::malformed(field, "empty calendar day"));
        }
        if bytes.len() > DAY_LEN && bytes[DAY_LEN..].iter().any(|&b| b != 0) {
            return Err(EnstoError::malformed(
                field,
                format!("expected {DAY_LEN} bytes, got {}", bytes.len()),
            ));
        }
        let mut raw = [0u8; DAY_LEN];
        let len = bytes.len().min(DAY_LEN);
        raw[..len].copy_from_slice(&bytes[..len]);

        let day = DayOfWeek::from_number(raw[0])
            .ok_or_else(|| EnstoError::malformed(field, format!("invalid day number {}", raw[0])))?;

        let mut programs = [CalendarProgram::disabled(); PROGRAMS_PER_DAY];
        for (index, chunk) in raw[1..].chunks_exact(PROGRAM_LEN).enumerate() {
            if chunk[7] == 0 {
                continue;
            }
            let program = CalendarProgram {
                start: ClockTime::new(chunk[0], chunk[1]),
                end: ClockTime::new(chunk[2], chunk[3]),
                offset: offset_at(chunk, 4),
                enabled: true,
            };
            if program.start.validate().is_err() || program.end.validate().is_err() {
                return Err(EnstoError::malformed(
                    field,
                    format!("program {index} has an invalid time {chunk:02x?}"),
                ));
            }
            programs[index] = program;
        }
        Ok(Self { day, programs })
    }
}

/// Last known calendar of every weekday.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeekCalendar {
    days: [Option<CalendarDay>; 7],
}

impl WeekCalendar {
    pub fn get(&self, day: DayOfWeek) -> Option<&CalendarDay> {
        self.days[day.index()].as_ref()
    }

    pub fn set(&mut self, calendar: CalendarDay) {
        let index = calendar.day.index();
        self.days[index] = Some(calendar);
    }

    pub fn is_loaded(&self) -> bool {
        self.days.iter().all(Option::is_some)
    }
}
