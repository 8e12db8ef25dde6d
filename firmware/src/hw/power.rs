//! Stop-mode entry and the clock and peripheral hand-off around it.

use embassy_stm32::interrupt::{self, InterruptExt};
use embassy_stm32::pac::{ADC1, PWR, RCC, pwr, rcc};
use embassy_stm32::rcc::Sysclk;
use node_core::power::PowerControl;
use node_core::time::spin_until;
use portable_atomic::{AtomicBool, Ordering};

use super::uart;

/// Checks of a ready or switch flag before giving up on it.
const READY_SPINS: u32 = 100_000;

/// Whether the ADC was on when the node went to sleep.
static ADC_WAS_ENABLED: AtomicBool = AtomicBool::new(false);

/// Stop mode with the regulator in low-power mode and the RTC running.
#[derive(Copy, Clone, Default)]
pub struct StopMode;

impl PowerControl for StopMode {
    fn quiesce_peripherals(&mut self) {
        interrupt::USART1.disable();
        uart::set_enabled(false);

        let adc_enabled = ADC1.cr().read().aden();
        ADC_WAS_ENABLED.store(adc_enabled, Ordering::Relaxed);
        if adc_enabled {
            ADC1.cr().modify(|w| w.set_addis(true));
            if !spin_until(READY_SPINS, || !ADC1.cr().read().aden()) {
                defmt::warn!("power: ADC still enabled before stop");
            }
        }

        // Wake onto HSI16 rather than MSI.
        RCC.cfgr()
            .modify(|w| w.set_stopwuck(rcc::vals::Stopwuck::from_bits(1)));
        PWR.cr().modify(|w| {
            w.set_pdds(pwr::vals::Pdds::from_bits(0));
            w.set_lpsdsr(true);
            w.set_ulp(true);
            w.set_fwu(true);
            w.set_cwuf(true);
        });
    }

    fn restore_clocks(&mut self) {
        RCC.cr().modify(|w| w.set_hsi16on(true));
        if !spin_until(READY_SPINS, || RCC.cr().read().hsi16rdyf()) {
            defmt::warn!("power: HSI16 not ready after wake");
        }
        RCC.cfgr().modify(|w| w.set_sw(Sysclk::HSI));
        if !spin_until(READY_SPINS, || {
            RCC.cfgr().read().sws().to_bits() == Sysclk::HSI.to_bits()
        }) {
            defmt::warn!("power: system clock did not switch to HSI16");
        }
    }

    fn resume_peripherals(&mut self) {
        if ADC_WAS_ENABLED.swap(false, Ordering::Relaxed) {
            ADC1.isr().write(|w| w.set_adrdy(true));
            ADC1.cr().modify(|w| w.set_aden(true));
            if !spin_until(READY_SPINS, || ADC1.isr().read().adrdy()) {
                defmt::warn!("power: ADC not ready after wake");
            }
        }

        uart::set_enabled(true);
        uart::clear_receive_errors();
        interrupt::USART1.unpend();
        // SAFETY: the USART1 handler only pushes into the receive ring.
        unsafe { interrupt::USART1.enable() };
    }

    fn enter_stop_mode(&mut self) {
        // SAFETY: the system control block is only touched here.
        let mut core = unsafe { cortex_m::Peripherals::steal() };
        PWR.cr().modify(|w| w.set_cwuf(true));
        core.SCB.set_sleepdeep();
        cortex_m::asm::dsb();
        cortex_m::asm::wfi();
        core.SCB.clear_sleepdeep();
    }
}
