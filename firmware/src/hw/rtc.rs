use embassy_stm32::interrupt::{self, InterruptExt};
use embassy_stm32::pac::{EXTI, PWR, RCC, RTC, rcc, rtc};
use node_core::calendar::{HourFormat, RtcRegisters};

use super::RTC_ALARM_LINE;

/// Alarm A.
const ALARM: usize = 0;

/// The RTC block, its LSI source and the alarm's EXTI line.
#[derive(Copy, Clone, Default)]
pub struct PacRtc;

impl PacRtc {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl RtcRegisters for PacRtc {
    fn enable_backup_access(&mut self) {
        RCC.apb1enr().modify(|w| w.set_pwren(true));
        PWR.cr().modify(|w| w.set_dbp(true));
    }

    fn reset_backup_domain(&mut self) {
        RCC.csr().modify(|w| w.set_rtcrst(true));
        RCC.csr().modify(|w| w.set_rtcrst(false));
    }

    fn enable_lsi(&mut self) {
        RCC.csr().modify(|w| w.set_lsion(true));
    }

    fn lsi_ready(&mut self) -> bool {
        RCC.csr().read().lsirdy()
    }

    fn select_lsi_clock(&mut self) {
        RCC.csr().modify(|w| {
            w.set_rtcsel(rcc::vals::Rtcsel::LSI);
            w.set_rtcen(true);
        });
    }

    fn write_protect_key(&mut self, key: u8) {
        RTC.wpr().write(|w| w.set_key(key));
    }

    fn enter_init_mode(&mut self) {
        RTC.isr().modify(|w| w.set_init(true));
    }

    fn init_mode_active(&mut self) -> bool {
        RTC.isr().read().initf()
    }

    fn exit_init_mode(&mut self) {
        RTC.isr().modify(|w| w.set_init(false));
    }

    fn set_prescaler(&mut self, asynchronous: u8, synchronous: u16) {
        // Synchronous half first; the register takes two separate writes.
        RTC.prer().write(|w| w.set_prediv_s(synchronous));
        RTC.prer().write(|w| {
            w.set_prediv_s(synchronous);
            w.set_prediv_a(asynchronous);
        });
    }

    fn set_hour_format(&mut self, format: HourFormat) {
        let bits = match format {
            HourFormat::TwentyFour => 0,
            HourFormat::Twelve => 1,
        };
        RTC.cr().modify(|w| w.set_fmt(rtc::vals::Fmt::from_bits(bits)));
    }

    fn read_time(&mut self) -> u32 {
        RTC.tr().read().0
    }

    fn write_time(&mut self, packed: u32) {
        RTC.tr().write_value(rtc::regs::Tr(packed));
    }

    fn read_date(&mut self) -> u32 {
        RTC.dr().read().0
    }

    fn write_date(&mut self, packed: u32) {
        RTC.dr().write_value(rtc::regs::Dr(packed));
    }

    fn disable_alarm(&mut self) {
        RTC.cr().modify(|w| {
            w.set_alre(ALARM, false);
            w.set_alrie(ALARM, false);
        });
    }

    fn alarm_writable(&mut self) -> bool {
        RTC.isr().read().alrwf(ALARM)
    }

    fn write_alarm(&mut self, packed: u32) {
        RTC.alrmr(ALARM).write_value(rtc::regs::Alrmr(packed));
    }

    fn alarm_pending(&mut self) -> bool {
        RTC.isr().read().alrf(ALARM)
    }

    fn clear_alarm_flag(&mut self) {
        // Flags clear on a zero write; INIT keeps its current value.
        RTC.isr().modify(|w| w.set_alrf(ALARM, false));
    }

    fn enable_alarm(&mut self) {
        RTC.cr().modify(|w| {
            w.set_alrie(ALARM, true);
            w.set_alre(ALARM, true);
        });
    }

    fn enable_alarm_line(&mut self) {
        EXTI.imr(0).modify(|w| w.set_line(RTC_ALARM_LINE, true));
        EXTI.rtsr(0).modify(|w| w.set_line(RTC_ALARM_LINE, true));
        interrupt::RTC.unpend();
        // SAFETY: the RTC handler only touches zero-sized register handles.
        unsafe { interrupt::RTC.enable() };
    }

    fn clear_alarm_line(&mut self) {
        EXTI.pr(0).write(|w| w.set_line(RTC_ALARM_LINE, true));
    }
}
