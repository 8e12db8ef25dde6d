//! Simulated MCU: tick counter, receive ring, RTC register block and stop
//! mode.
//!
//! Every peripheral handle borrows one [`Host`], the same way the firmware's
//! zero-sized register handles all reach the one set of hardware registers.
//! That lets the simulated stop mode run the alarm interrupt body while the
//! main loop is still inside `sleep_cycle`.

use std::cell::{Cell, RefCell};

use node_core::calendar::{Calendar, HourFormat, LOCK_KEYS, TimeOfDay, UNLOCK_KEYS, bcd_to_bin};
use node_core::power::{AlarmWake, PowerControl, PowerSequencer, TickGate};
use node_core::rx::RxRing;
use node_core::time::Monotonic;

const SECONDS_PER_DAY: u32 = 86_400;

/// Network wall clock at emulator start, as seconds since midnight.
pub const NETWORK_EPOCH_SECS: u32 = 21 * 3_600 + 3 * 60 + 27;

/// Polls before the simulated LSI oscillator reports ready.
const LSI_STARTUP_POLLS: u32 = 3;

/// Polls before the simulated RTC acknowledges init mode.
const INIT_MODE_POLLS: u32 = 2;

const TIME_MASK: u32 = 0x003F_7F7F;
const ALARM_IGNORE_DATE: u32 = 1 << 31;

/// The whole simulated board.
pub struct Host {
    pub rx: RxRing,
    now: Cell<u32>,
    tick_enabled: Cell<bool>,
    inbound: RefCell<Vec<(u32, Vec<u8>)>>,
    rtc: RefCell<RtcBank>,
    slept_secs: Cell<u32>,
    pub wake: AlarmWake,
    notes: RefCell<Vec<String>>,
}

impl Host {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rx: RxRing::new(),
            now: Cell::new(0),
            tick_enabled: Cell::new(true),
            inbound: RefCell::new(Vec::new()),
            rtc: RefCell::new(RtcBank::default()),
            slept_secs: Cell::new(0),
            wake: AlarmWake::new(),
            notes: RefCell::new(Vec::new()),
        }
    }

    /// Queues bytes on the modem line, visible to the receive ring after
    /// `delay_ms` ticks.
    pub fn deliver_after(&self, delay_ms: u32, bytes: &[u8]) {
        let due = self.now.get().wrapping_add(delay_ms);
        self.inbound.borrow_mut().push((due, bytes.to_vec()));
    }

    /// Seconds since midnight on the network's clock.
    #[must_use]
    pub fn network_seconds(&self) -> u32 {
        (NETWORK_EPOCH_SECS + self.slept_secs.get() + self.now.get() / 1_000) % SECONDS_PER_DAY
    }

    #[must_use]
    pub fn ticks(&self) -> u32 {
        self.now.get()
    }

    #[cfg(test)]
    pub fn tick_enabled(&self) -> bool {
        self.tick_enabled.get()
    }

    /// Records a hardware event for the transcript.
    pub fn note(&self, message: impl Into<String>) {
        self.notes.borrow_mut().push(message.into());
    }

    #[must_use]
    pub fn take_notes(&self) -> Vec<String> {
        std::mem::take(&mut *self.notes.borrow_mut())
    }

    fn publish_due(&self) {
        let now = self.now.get();
        self.inbound.borrow_mut().retain(|(due, bytes)| {
            if now.wrapping_sub(*due) < u32::MAX / 2 {
                // Receive interrupt: one byte at a time into the ring.
                for &byte in bytes {
                    self.rx.push(byte);
                }
                false
            } else {
                true
            }
        });
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl Monotonic for Host {
    /// One poll is one millisecond while the tick interrupt is enabled.
    fn now_ms(&self) -> u32 {
        if self.tick_enabled.get() {
            self.now.set(self.now.get().wrapping_add(1));
        }
        self.publish_due();
        self.now.get()
    }
}

/// RTC, PWR and EXTI registers that survive stop mode.
#[derive(Debug, Default)]
struct RtcBank {
    unlock_progress: u8,
    unlocked: bool,
    backup_access: bool,
    lsi_polls: Option<u32>,
    lsi_selected: bool,
    init_polls: Option<u32>,
    time: u32,
    date: u32,
    alarm: u32,
    alarm_enabled: bool,
    alarm_flag: bool,
    alarm_line: bool,
    alarm_line_pending: bool,
}

impl RtcBank {
    fn key(&mut self, key: u8) {
        if key == UNLOCK_KEYS[0] {
            self.unlock_progress = 1;
        } else if key == UNLOCK_KEYS[1] && self.unlock_progress == 1 {
            self.unlock_progress = 0;
            self.unlocked = true;
        } else {
            self.unlock_progress = 0;
            self.unlocked = false;
        }
    }

    fn in_init_mode(&self) -> bool {
        self.init_polls == Some(0)
    }

    /// Advances the calendar to the armed alarm and raises it.
    ///
    /// Returns the seconds slept, or `None` when no alarm is armed.
    fn run_to_alarm(&mut self) -> Option<u32> {
        if !self.alarm_enabled {
            return None;
        }
        let now = unpack(self.time).seconds_of_day();
        let target = unpack(self.alarm).seconds_of_day();
        let mut slept = (target + SECONDS_PER_DAY - now) % SECONDS_PER_DAY;
        if slept == 0 {
            slept = SECONDS_PER_DAY;
        }

        // The date register does not roll over midnight in the emulator.
        self.time = self.alarm & TIME_MASK;
        self.alarm_flag = true;
        self.alarm_line_pending = self.alarm_line;
        Some(slept)
    }
}

fn unpack(packed: u32) -> TimeOfDay {
    let [_, hour, minute, second] = packed.to_be_bytes();
    TimeOfDay::new(
        bcd_to_bin(hour & 0x3F),
        bcd_to_bin(minute & 0x7F),
        bcd_to_bin(second & 0x7F),
    )
}

/// Handle onto the simulated RTC block.
#[derive(Copy, Clone)]
pub struct SimRtc<'h> {
    host: &'h Host,
}

impl<'h> SimRtc<'h> {
    #[must_use]
    pub const fn new(host: &'h Host) -> Self {
        Self { host }
    }

    /// Runs `write` only when the write protection is lifted.
    fn protected(&self, register: &str, write: impl FnOnce(&mut RtcBank)) {
        let mut bank = self.host.rtc.borrow_mut();
        if bank.unlocked {
            write(&mut *bank);
        } else {
            drop(bank);
            self.host.note(format!("rtc: {register} write ignored, registers locked"));
        }
    }

    /// Same as [`SimRtc::protected`], and also requires init mode.
    fn calendar_write(&self, register: &str, write: impl FnOnce(&mut RtcBank)) {
        self.protected(register, |bank| {
            if bank.in_init_mode() {
                write(bank);
            }
        });
    }
}

impl node_core::calendar::RtcRegisters for SimRtc<'_> {
    fn enable_backup_access(&mut self) {
        self.host.rtc.borrow_mut().backup_access = true;
    }

    fn reset_backup_domain(&mut self) {
        let mut bank = self.host.rtc.borrow_mut();
        let backup_access = bank.backup_access;
        *bank = RtcBank {
            backup_access,
            date: 0x0000_2101,
            ..RtcBank::default()
        };
    }

    fn enable_lsi(&mut self) {
        self.host.rtc.borrow_mut().lsi_polls = Some(LSI_STARTUP_POLLS);
    }

    fn lsi_ready(&mut self) -> bool {
        let mut bank = self.host.rtc.borrow_mut();
        match bank.lsi_polls {
            Some(0) => true,
            Some(left) => {
                bank.lsi_polls = Some(left - 1);
                false
            }
            None => false,
        }
    }

    fn select_lsi_clock(&mut self) {
        self.host.rtc.borrow_mut().lsi_selected = true;
    }

    fn write_protect_key(&mut self, key: u8) {
        self.host.rtc.borrow_mut().key(key);
        if key == LOCK_KEYS[1] {
            self.host.note("rtc: locked");
        }
    }

    fn enter_init_mode(&mut self) {
        self.protected("ISR.INIT", |bank| bank.init_polls = Some(INIT_MODE_POLLS));
    }

    fn init_mode_active(&mut self) -> bool {
        let mut bank = self.host.rtc.borrow_mut();
        match bank.init_polls {
            Some(0) => true,
            Some(left) => {
                bank.init_polls = Some(left - 1);
                false
            }
            None => false,
        }
    }

    fn exit_init_mode(&mut self) {
        self.host.rtc.borrow_mut().init_polls = None;
    }

    fn set_prescaler(&mut self, asynchronous: u8, synchronous: u16) {
        self.host.note(format!(
            "rtc: prescaler {asynchronous}/{synchronous}, LSI selected: {}",
            self.host.rtc.borrow().lsi_selected
        ));
    }

    fn set_hour_format(&mut self, format: HourFormat) {
        let host = self.host;
        self.calendar_write("CR.FMT", |_| {
            if format == HourFormat::Twelve {
                host.note("rtc: 12 hour format selected");
            }
        });
    }

    fn read_time(&mut self) -> u32 {
        self.host.rtc.borrow().time
    }

    fn write_time(&mut self, packed: u32) {
        self.calendar_write("TR", |bank| bank.time = packed);
    }

    fn read_date(&mut self) -> u32 {
        self.host.rtc.borrow().date
    }

    fn write_date(&mut self, packed: u32) {
        self.calendar_write("DR", |bank| bank.date = packed);
    }

    fn disable_alarm(&mut self) {
        self.protected("CR.ALRAE", |bank| bank.alarm_enabled = false);
    }

    fn alarm_writable(&mut self) -> bool {
        let bank = self.host.rtc.borrow();
        bank.unlocked && !bank.alarm_enabled
    }

    fn write_alarm(&mut self, packed: u32) {
        debug_assert!(packed & ALARM_IGNORE_DATE != 0);
        self.protected("ALRMAR", |bank| bank.alarm = packed);
    }

    fn alarm_pending(&mut self) -> bool {
        self.host.rtc.borrow().alarm_flag
    }

    fn clear_alarm_flag(&mut self) {
        self.host.rtc.borrow_mut().alarm_flag = false;
    }

    fn enable_alarm(&mut self) {
        self.protected("CR.ALRAE", |bank| bank.alarm_enabled = true);
    }

    fn enable_alarm_line(&mut self) {
        self.host.rtc.borrow_mut().alarm_line = true;
    }

    fn clear_alarm_line(&mut self) {
        self.host.rtc.borrow_mut().alarm_line_pending = false;
    }
}

/// Handle onto the tick interrupt enable.
#[derive(Copy, Clone)]
pub struct SimTick<'h> {
    host: &'h Host,
}

impl<'h> SimTick<'h> {
    #[must_use]
    pub const fn new(host: &'h Host) -> Self {
        Self { host }
    }
}

impl TickGate for SimTick<'_> {
    fn disable_tick(&mut self) {
        self.host.tick_enabled.set(false);
    }

    fn enable_tick(&mut self) {
        self.host.tick_enabled.set(true);
    }
}

/// Handle onto the clock tree and low-power controller.
#[derive(Copy, Clone)]
pub struct SimPower<'h> {
    host: &'h Host,
}

impl<'h> SimPower<'h> {
    #[must_use]
    pub const fn new(host: &'h Host) -> Self {
        Self { host }
    }
}

impl PowerControl for SimPower<'_> {
    fn quiesce_peripherals(&mut self) {
        self.host.note("power: peripherals quiesced");
    }

    fn restore_clocks(&mut self) {
        self.host.note("power: system clock restored");
    }

    fn resume_peripherals(&mut self) {
        self.host.note("power: peripherals resumed");
    }

    /// Halts until the armed alarm fires, then runs the alarm interrupt.
    ///
    /// # Panics
    ///
    /// Panics when no alarm is armed or its interrupt line is off; the real
    /// node would never wake.
    fn enter_stop_mode(&mut self) {
        let host = self.host;
        let alarm = host.rtc.borrow_mut().run_to_alarm();
        let Some(slept) = alarm else {
            panic!("stop mode entered with no wake source armed");
        };
        assert!(
            host.rtc.borrow().alarm_line_pending,
            "alarm fired with its interrupt line disabled"
        );
        host.slept_secs.set(host.slept_secs.get() + slept);
        host.note(format!("power: stop mode for {slept} s"));

        let mut calendar = Calendar::new(SimRtc::new(host));
        let mut sequencer = PowerSequencer::new(SimPower::new(host), SimTick::new(host));
        if !host.wake.on_interrupt(&mut calendar, &mut sequencer) {
            host.note("power: spurious wake");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use node_core::calendar::{CalendarError, RtcRegisters};
    use node_core::config::DEFAULT_CALENDAR;
    use node_core::power::sleep_cycle;

    #[test]
    fn locked_registers_ignore_writes() {
        let host = Host::new();
        let mut calendar = Calendar::new(SimRtc::new(&host));
        calendar.init(&DEFAULT_CALENDAR).expect("init");
        assert_eq!(calendar.now(), DEFAULT_CALENDAR);

        host.rtc.borrow_mut().key(0x00);
        SimRtc::new(&host).write_alarm(0x8000_0001);
        assert_eq!(host.rtc.borrow().alarm, 0);
        assert!(host.take_notes().iter().any(|note| note.contains("ALRMAR")));
    }

    #[test]
    fn sleep_runs_the_calendar_to_the_alarm() {
        let host = Host::new();
        let mut calendar = Calendar::new(SimRtc::new(&host));
        calendar.init(&DEFAULT_CALENDAR).expect("init");
        let mut sequencer = PowerSequencer::new(SimPower::new(&host), SimTick::new(&host));

        let alarm = sleep_cycle(&mut sequencer, &mut calendar, &host.wake, 90).expect("armed");

        assert_eq!(alarm, TimeOfDay::new(20, 46, 30));
        assert_eq!(calendar.read_time(), alarm);
        assert!(host.tick_enabled());
        assert!(!host.rtc.borrow().alarm_flag);
        assert!(!host.rtc.borrow().alarm_line_pending);
        assert_eq!(host.slept_secs.get(), 90);
    }

    #[test]
    fn init_mode_is_refused_while_locked() {
        let host = Host::new();
        let mut rtc = SimRtc::new(&host);
        RtcRegisters::enter_init_mode(&mut rtc);
        assert!(!RtcRegisters::init_mode_active(&mut rtc));

        let mut calendar = Calendar::new(rtc);
        assert_eq!(
            calendar.set_time(&TimeOfDay::new(7, 0, 0)),
            Err(CalendarError::InitModeTimeout)
        );
    }
}
