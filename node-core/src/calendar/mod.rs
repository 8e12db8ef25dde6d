//! Calendar values, BCD conversion and alarm arithmetic.
//!
//! The RTC keeps wall-clock time as packed BCD in its time and date
//! registers. Everything above the register layer works in binary
//! [`TimeOfDay`] / [`CalendarDate`] values, validated against fixed maxima
//! before anything is committed to hardware.

mod clock;

use core::fmt;

pub use clock::{
    ALARM_WRITABLE_SPINS, Calendar, CommitReport, INIT_MODE_SPINS, LOCK_KEYS, LSI_READY_SPINS,
    PRESCALER_ASYNC, PRESCALER_SYNC, RtcRegisters, UNLOCK_KEYS,
};

pub const MAX_HOUR: u8 = 23;
pub const MAX_MINUTE: u8 = 59;
pub const MAX_SECOND: u8 = 59;
pub const MAX_MONTH: u8 = 12;
pub const MAX_DAY: u8 = 31;
pub const MAX_WEEKDAY: u8 = 7;
pub const MAX_YEAR: u8 = 99;

/// Offset between the two-digit RTC year and the calendar year.
pub const CENTURY_BASE: i32 = 2000;

/// Converts a binary value (0-99) to packed BCD.
#[must_use]
pub const fn bin_to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Converts packed BCD to binary.
#[must_use]
pub const fn bcd_to_bin(value: u8) -> u8 {
    (value >> 4) * 10 + (value & 0x0F)
}

/// Hour numbering written to the RTC control register.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum HourFormat {
    #[default]
    TwentyFour,
    Twelve,
}

/// Hour, minute and second in binary.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl TimeOfDay {
    #[must_use]
    pub const fn new(hour: u8, minute: u8, second: u8) -> Self {
        Self {
            hour,
            minute,
            second,
        }
    }

    /// Checks every field against its maximum for `format`.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidTime`] when a field is out of range.
    pub const fn validate(&self, format: HourFormat) -> Result<(), CalendarError> {
        let hour_ok = match format {
            HourFormat::TwentyFour => self.hour <= MAX_HOUR,
            HourFormat::Twelve => self.hour >= 1 && self.hour <= 12,
        };
        if hour_ok && self.minute <= MAX_MINUTE && self.second <= MAX_SECOND {
            Ok(())
        } else {
            Err(CalendarError::InvalidTime)
        }
    }

    /// Time of day `seconds` from now.
    ///
    /// The offset is split into hours, minutes and seconds and added field
    /// by field. Carries move seconds into minutes and minutes into hours;
    /// hours wrap at 24 and the date never advances.
    #[must_use]
    pub const fn after(self, seconds: u32) -> Self {
        let add_hours = seconds / 3_600;
        let add_minutes = (seconds % 3_600) / 60;
        let add_seconds = seconds % 60;

        let mut second = self.second as u32 + add_seconds;
        let mut minute = self.minute as u32 + add_minutes;
        let mut hour = self.hour as u32 + add_hours;

        if second >= 60 {
            second -= 60;
            minute += 1;
        }
        if minute >= 60 {
            minute -= 60;
            hour += 1;
        }
        hour %= 24;

        Self::new(narrow(hour), narrow(minute), narrow(second))
    }

    /// Seconds since midnight.
    #[must_use]
    pub const fn seconds_of_day(&self) -> u32 {
        self.hour as u32 * 3_600 + self.minute as u32 * 60 + self.second as u32
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// Weekday (Monday = 1), month, day and two-digit year in binary.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CalendarDate {
    pub weekday: u8,
    pub month: u8,
    pub day: u8,
    pub year: u8,
}

impl CalendarDate {
    #[must_use]
    pub const fn new(weekday: u8, month: u8, day: u8, year: u8) -> Self {
        Self {
            weekday,
            month,
            day,
            year,
        }
    }

    /// Checks every field against its range.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidDate`] when a field is out of range.
    pub const fn validate(&self) -> Result<(), CalendarError> {
        let weekday_ok = self.weekday >= 1 && self.weekday <= MAX_WEEKDAY;
        let month_ok = self.month >= 1 && self.month <= MAX_MONTH;
        let day_ok = self.day >= 1 && self.day <= MAX_DAY;
        if weekday_ok && month_ok && day_ok && self.year <= MAX_YEAR {
            Ok(())
        } else {
            Err(CalendarError::InvalidDate)
        }
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let weekday = WEEKDAY_NAMES
            .get(usize::from(self.weekday.wrapping_sub(1)))
            .copied()
            .unwrap_or("???");
        write!(
            f,
            "{weekday} 20{:02}-{:02}-{:02}",
            self.year, self.month, self.day
        )
    }
}

/// Full calendar value committed to the RTC.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CalendarTime {
    pub date: CalendarDate,
    pub time: TimeOfDay,
    pub format: HourFormat,
}

impl CalendarTime {
    #[must_use]
    pub const fn new(date: CalendarDate, time: TimeOfDay) -> Self {
        Self {
            date,
            time,
            format: HourFormat::TwentyFour,
        }
    }

    /// Builds a calendar value from the pieces of an SNTP time string such as
    /// `Thu Aug 08 20:45:00 2024`.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidDate`] for an unknown weekday or month
    /// name or a year outside 2000-2099, and [`CalendarError::InvalidTime`]
    /// for an out-of-range time.
    pub fn from_network(
        weekday: &str,
        month: &str,
        day: i32,
        time: (i32, i32, i32),
        year: i32,
    ) -> Result<Self, CalendarError> {
        let weekday = weekday_from_name(weekday).ok_or(CalendarError::InvalidDate)?;
        let month = month_from_name(month).ok_or(CalendarError::InvalidDate)?;
        let day = u8::try_from(day).map_err(|_| CalendarError::InvalidDate)?;
        let year = u8::try_from(year.wrapping_sub(CENTURY_BASE))
            .map_err(|_| CalendarError::InvalidDate)?;

        let (hour, minute, second) = time;
        let time = TimeOfDay::new(
            u8::try_from(hour).map_err(|_| CalendarError::InvalidTime)?,
            u8::try_from(minute).map_err(|_| CalendarError::InvalidTime)?,
            u8::try_from(second).map_err(|_| CalendarError::InvalidTime)?,
        );

        let value = Self::new(CalendarDate::new(weekday, month, day, year), time);
        value.date.validate()?;
        value.time.validate(value.format)?;
        Ok(value)
    }
}

impl fmt::Display for CalendarTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.time)
    }
}

/// Failures reported by the calendar layer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CalendarError {
    /// The low-speed oscillator never reported ready.
    ClockSourceTimeout,
    /// The RTC never entered initialization mode.
    InitModeTimeout,
    /// Alarm A never became writable.
    AlarmNotWritable,
    /// A time field is out of range.
    InvalidTime,
    /// A date field is out of range.
    InvalidDate,
}

impl fmt::Display for CalendarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CalendarError::ClockSourceTimeout => "low-speed clock did not start",
            CalendarError::InitModeTimeout => "RTC did not enter init mode",
            CalendarError::AlarmNotWritable => "alarm registers not writable",
            CalendarError::InvalidTime => "invalid time",
            CalendarError::InvalidDate => "invalid date",
        })
    }
}

const WEEKDAY_NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Maps a three-letter English month name to 1-12.
#[must_use]
pub fn month_from_name(name: &str) -> Option<u8> {
    index_of(&MONTH_NAMES, name)
}

/// Maps a three-letter English weekday name to 1-7 (Monday = 1).
#[must_use]
pub fn weekday_from_name(name: &str) -> Option<u8> {
    index_of(&WEEKDAY_NAMES, name)
}

fn index_of(names: &[&str], name: &str) -> Option<u8> {
    names
        .iter()
        .position(|candidate| candidate.eq_ignore_ascii_case(name))
        .and_then(|index| u8::try_from(index + 1).ok())
}

#[allow(clippy::cast_possible_truncation)]
const fn narrow(value: u32) -> u8 {
    value as u8
}
