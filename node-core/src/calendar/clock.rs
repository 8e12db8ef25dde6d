use super::{
    CalendarDate, CalendarError, CalendarTime, HourFormat, TimeOfDay, bcd_to_bin, bin_to_bcd,
};
use crate::time::spin_until;

/// Checks of the LSI ready flag before giving up.
pub const LSI_READY_SPINS: u32 = 10_000_000;
/// Checks of the init-mode flag before giving up.
pub const INIT_MODE_SPINS: u32 = 2_000_000;
/// Checks of the alarm-writable flag before giving up.
pub const ALARM_WRITABLE_SPINS: u32 = 200_000;

/// Write-protection key sequence that unlocks the RTC registers.
pub const UNLOCK_KEYS: [u8; 2] = [0xCA, 0x53];
/// Any wrong key re-arms the write protection.
pub const LOCK_KEYS: [u8; 2] = [0xFE, 0x64];

/// Asynchronous and synchronous prescalers for a 1 Hz calendar from the
/// 32 kHz LSI: 32_000 / (127 + 1) / (249 + 1).
pub const PRESCALER_ASYNC: u8 = 127;
pub const PRESCALER_SYNC: u16 = 249;

const ALARM_IGNORE_DATE: u32 = 1 << 31;

/// Register-level access to the RTC block and the bits around it.
///
/// Time, date and alarm values cross this seam in the hardware's packed BCD
/// layout; everything else is a single flag or key write.
pub trait RtcRegisters {
    /// Enables the power interface and lifts backup-domain write protection.
    fn enable_backup_access(&mut self);
    /// Pulses the backup-domain reset.
    fn reset_backup_domain(&mut self);
    fn enable_lsi(&mut self);
    fn lsi_ready(&mut self) -> bool;
    /// Routes LSI to the RTC and enables the RTC clock.
    fn select_lsi_clock(&mut self);
    fn write_protect_key(&mut self, key: u8);
    fn enter_init_mode(&mut self);
    fn init_mode_active(&mut self) -> bool;
    fn exit_init_mode(&mut self);
    fn set_prescaler(&mut self, asynchronous: u8, synchronous: u16);
    fn set_hour_format(&mut self, format: HourFormat);
    fn read_time(&mut self) -> u32;
    fn write_time(&mut self, packed: u32);
    fn read_date(&mut self) -> u32;
    fn write_date(&mut self, packed: u32);
    fn disable_alarm(&mut self);
    fn alarm_writable(&mut self) -> bool;
    /// Writes the alarm match register; sub-second matching is left off.
    fn write_alarm(&mut self, packed: u32);
    fn alarm_pending(&mut self) -> bool;
    fn clear_alarm_flag(&mut self);
    /// Sets the alarm interrupt enable and the alarm enable bits.
    fn enable_alarm(&mut self);
    /// Unmasks the alarm's external interrupt line (rising edge) and the RTC
    /// interrupt vector.
    fn enable_alarm_line(&mut self);
    fn clear_alarm_line(&mut self);
}

/// Which halves of a calendar update reached the registers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CommitReport {
    pub time: Result<(), CalendarError>,
    pub date: Result<(), CalendarError>,
}

impl CommitReport {
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.time.is_ok() && self.date.is_ok()
    }

    /// First rejected half, if any.
    ///
    /// # Errors
    ///
    /// Returns the time error before the date error.
    pub const fn into_result(self) -> Result<(), CalendarError> {
        match (self.time, self.date) {
            (Err(error), _) | (Ok(()), Err(error)) => Err(error),
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}

/// RTC driver built on [`RtcRegisters`].
pub struct Calendar<R> {
    regs: R,
    format: HourFormat,
}

impl<R> Calendar<R>
where
    R: RtcRegisters,
{
    #[must_use]
    pub const fn new(regs: R) -> Self {
        Self {
            regs,
            format: HourFormat::TwentyFour,
        }
    }

    pub fn registers_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    /// Brings the RTC up from reset and commits `initial`.
    ///
    /// Time and date are validated independently: a rejected half leaves
    /// its registers as they were and is reported in the [`CommitReport`],
    /// while the other half is still written.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::ClockSourceTimeout`] when the LSI never
    /// starts and [`CalendarError::InitModeTimeout`] when the RTC never
    /// accepts configuration.
    pub fn init(&mut self, initial: &CalendarTime) -> Result<CommitReport, CalendarError> {
        self.regs.enable_backup_access();
        self.regs.reset_backup_domain();
        self.regs.enable_lsi();
        if !spin_until(LSI_READY_SPINS, || self.regs.lsi_ready()) {
            return Err(CalendarError::ClockSourceTimeout);
        }
        self.regs.select_lsi_clock();

        self.commit(initial, true)
    }

    /// Commits a full calendar value without resetting the RTC.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InitModeTimeout`] when the RTC never accepts
    /// configuration; validation failures are reported in the
    /// [`CommitReport`].
    pub fn set(&mut self, value: &CalendarTime) -> Result<CommitReport, CalendarError> {
        self.commit(value, false)
    }

    /// Updates hours, minutes and seconds only.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidTime`] before touching any register,
    /// or [`CalendarError::InitModeTimeout`].
    pub fn set_time(&mut self, time: &TimeOfDay) -> Result<(), CalendarError> {
        time.validate(self.format)?;
        self.configure(|regs| regs.write_time(pack_time(*time)))
    }

    /// Updates weekday, month, day and year only.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::InvalidDate`] before touching any register,
    /// or [`CalendarError::InitModeTimeout`].
    pub fn set_date(&mut self, date: &CalendarDate) -> Result<(), CalendarError> {
        date.validate()?;
        self.configure(|regs| regs.write_date(pack_date(*date)))
    }

    pub fn read_time(&mut self) -> TimeOfDay {
        unpack_time(self.regs.read_time())
    }

    pub fn read_date(&mut self) -> CalendarDate {
        unpack_date(self.regs.read_date())
    }

    pub fn now(&mut self) -> CalendarTime {
        CalendarTime {
            date: self.read_date(),
            time: self.read_time(),
            format: self.format,
        }
    }

    /// Arms alarm A to fire `seconds` from the current time of day.
    ///
    /// The alarm matches hours, minutes and seconds; the date is ignored, so
    /// an offset that crosses midnight fires on the wrapped time.
    ///
    /// # Errors
    ///
    /// Returns [`CalendarError::AlarmNotWritable`] when the alarm registers
    /// never unlock; the previous alarm match value is left in place.
    pub fn schedule_alarm(&mut self, seconds: u32) -> Result<TimeOfDay, CalendarError> {
        self.unlock();
        self.regs.disable_alarm();
        if !spin_until(ALARM_WRITABLE_SPINS, || self.regs.alarm_writable()) {
            self.lock();
            return Err(CalendarError::AlarmNotWritable);
        }

        let alarm = self.read_time().after(seconds);
        self.regs.write_alarm(pack_alarm(alarm));
        self.regs.clear_alarm_flag();
        self.regs.enable_alarm();
        self.regs.enable_alarm_line();
        self.lock();

        Ok(alarm)
    }

    /// Clears a pending alarm and its interrupt line.
    ///
    /// Returns `false` when no alarm was pending.
    pub fn acknowledge_alarm(&mut self) -> bool {
        if !self.regs.alarm_pending() {
            return false;
        }
        self.regs.clear_alarm_flag();
        self.regs.clear_alarm_line();
        true
    }

    fn commit(
        &mut self,
        value: &CalendarTime,
        program_prescaler: bool,
    ) -> Result<CommitReport, CalendarError> {
        let format = value.format;
        let time = value.time.validate(format);
        let date = value.date.validate();

        self.configure(|regs| {
            if program_prescaler {
                regs.set_prescaler(PRESCALER_ASYNC, PRESCALER_SYNC);
            }
            // The hour format belongs to the time half.
            if time.is_ok() {
                regs.set_hour_format(format);
                regs.write_time(pack_time(value.time));
            }
            if date.is_ok() {
                regs.write_date(pack_date(value.date));
            }
        })?;
        if time.is_ok() {
            self.format = format;
        }

        Ok(CommitReport { time, date })
    }

    fn configure<T>(&mut self, apply: impl FnOnce(&mut R) -> T) -> Result<T, CalendarError> {
        self.unlock();
        self.regs.enter_init_mode();
        if !spin_until(INIT_MODE_SPINS, || self.regs.init_mode_active()) {
            self.regs.exit_init_mode();
            self.lock();
            return Err(CalendarError::InitModeTimeout);
        }

        let output = apply(&mut self.regs);

        self.regs.exit_init_mode();
        self.lock();
        Ok(output)
    }

    fn unlock(&mut self) {
        for key in UNLOCK_KEYS {
            self.regs.write_protect_key(key);
        }
    }

    fn lock(&mut self) {
        for key in LOCK_KEYS {
            self.regs.write_protect_key(key);
        }
    }
}

/// Packs a time into the time-register layout (BCD hour/minute/second).
fn pack_time(time: TimeOfDay) -> u32 {
    (u32::from(bin_to_bcd(time.hour)) << 16)
        | (u32::from(bin_to_bcd(time.minute)) << 8)
        | u32::from(bin_to_bcd(time.second))
}

fn unpack_time(packed: u32) -> TimeOfDay {
    TimeOfDay::new(
        bcd_to_bin(field(packed, 16, 0x3F)),
        bcd_to_bin(field(packed, 8, 0x7F)),
        bcd_to_bin(field(packed, 0, 0x7F)),
    )
}

/// Packs a date into the date-register layout.
fn pack_date(date: CalendarDate) -> u32 {
    (u32::from(bin_to_bcd(date.year)) << 16)
        | (u32::from(date.weekday) << 13)
        | (u32::from(bin_to_bcd(date.month)) << 8)
        | u32::from(bin_to_bcd(date.day))
}

fn unpack_date(packed: u32) -> CalendarDate {
    CalendarDate::new(
        field(packed, 13, 0x07),
        bcd_to_bin(field(packed, 8, 0x1F)),
        bcd_to_bin(field(packed, 0, 0x3F)),
        bcd_to_bin(field(packed, 16, 0xFF)),
    )
}

/// Packs an alarm match on hour, minute and second with the date masked.
fn pack_alarm(time: TimeOfDay) -> u32 {
    ALARM_IGNORE_DATE | pack_time(time)
}

#[allow(clippy::cast_possible_truncation)]
fn field(packed: u32, shift: u32, mask: u8) -> u8 {
    ((packed >> shift) as u8) & mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_time_register_layout() {
        let packed = pack_time(TimeOfDay::new(20, 45, 7));
        assert_eq!(packed, 0x0020_4507);
        assert_eq!(unpack_time(packed), TimeOfDay::new(20, 45, 7));
    }

    #[test]
    fn packs_date_register_layout() {
        let date = CalendarDate::new(2, 9, 8, 24);
        let packed = pack_date(date);
        assert_eq!(packed, 0x0024_4908);
        assert_eq!(unpack_date(packed), date);
    }

    #[test]
    fn alarm_ignores_date_only() {
        let packed = pack_alarm(TimeOfDay::new(0, 0, 10));
        assert_eq!(packed, 0x8000_0010);
    }

    #[test]
    fn commit_report_prefers_time_error() {
        let report = CommitReport {
            time: Err(CalendarError::InvalidTime),
            date: Err(CalendarError::InvalidDate),
        };
        assert!(!report.is_complete());
        assert_eq!(report.into_result(), Err(CalendarError::InvalidTime));
    }
}
