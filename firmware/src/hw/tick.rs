use cortex_m::peripheral::SYST;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m_rt::exception;
use node_core::power::TickGate;
use node_core::time::Monotonic;
use portable_atomic::{AtomicU32, Ordering};

pub const TICK_HZ: u32 = 1_000;

static TICKS: AtomicU32 = AtomicU32::new(0);

/// Starts the 1 kHz SysTick interrupt from the core clock.
pub fn start(mut syst: SYST, sysclk_hz: u32) {
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(sysclk_hz / TICK_HZ - 1);
    syst.clear_current();
    syst.enable_interrupt();
    syst.enable_counter();
}

#[exception]
fn SysTick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Millisecond clock counted by the SysTick handler.
#[derive(Copy, Clone, Default)]
pub struct SysTickClock;

impl Monotonic for SysTickClock {
    fn now_ms(&self) -> u32 {
        critical_section::with(|_| TICKS.load(Ordering::Relaxed))
    }
}

/// Gates the SysTick interrupt around stop mode.
#[derive(Copy, Clone, Default)]
pub struct SysTickGate;

impl SysTickGate {
    fn syst() -> SYST {
        // SAFETY: SysTick is only reconfigured from the control loop and the
        // alarm handler, never concurrently.
        unsafe { cortex_m::Peripherals::steal() }.SYST
    }
}

impl TickGate for SysTickGate {
    fn disable_tick(&mut self) {
        let mut syst = Self::syst();
        syst.disable_interrupt();
        syst.disable_counter();
    }

    fn enable_tick(&mut self) {
        let mut syst = Self::syst();
        syst.clear_current();
        syst.enable_interrupt();
        syst.enable_counter();
    }
}
