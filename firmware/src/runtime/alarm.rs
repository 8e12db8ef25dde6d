use embassy_stm32::interrupt;
use node_core::calendar::{Calendar, RtcRegisters};
use node_core::power::{AlarmWake, PowerSequencer};

use crate::hw::power::StopMode;
use crate::hw::rtc::PacRtc;
use crate::hw::tick::SysTickGate;

/// Set by the RTC handler, consumed by the sleep loop.
pub static ALARM_WAKE: AlarmWake = AlarmWake::new();

#[interrupt]
fn RTC() {
    let mut calendar = Calendar::new(PacRtc::new());
    let mut sequencer = PowerSequencer::new(StopMode, SysTickGate);
    if !ALARM_WAKE.on_interrupt(&mut calendar, &mut sequencer) {
        defmt::warn!("rtc: interrupt without a pending alarm");
        calendar.registers_mut().clear_alarm_line();
    }
}
