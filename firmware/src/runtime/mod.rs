use cortex_m::interrupt;
use cortex_m::register::primask;
use cortex_m_rt::{ExceptionFrame, entry, exception};
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_stm32 as hal;
use embassy_stm32::rcc::Sysclk;
use embassy_stm32::usart::{self, Uart};
use node_core::at::AtEngine;
use node_core::config::NodeConfig;
use node_core::modem::Modem;

use crate::hw::tick::{self, SysTickClock};
use crate::hw::uart::{self as modem_uart, MODEM_RX, UartTransport};

mod alarm;
mod cycle_task;
mod exchange_log;

use exchange_log::ExchangeLog;

/// HSI16 drives the core, and stop mode wakes back onto it.
const SYSCLK_HZ: u32 = 16_000_000;
const MODEM_BAUD: u32 = 115_200;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

#[entry]
fn main() -> ! {
    let mut config = hal::Config::default();
    config.rcc.hsi = true;
    config.rcc.sys = Sysclk::HSI;
    let p = hal::init(config);

    let Some(core) = cortex_m::Peripherals::take() else {
        defmt::panic!("core peripherals already taken");
    };
    tick::start(core.SYST, SYSCLK_HZ);

    let mut uart_config = usart::Config::default();
    uart_config.baudrate = MODEM_BAUD;
    let Ok(uart) = Uart::new_blocking(p.USART1, p.PA10, p.PA9, uart_config) else {
        defmt::panic!("USART1 configuration rejected");
    };
    // The receive half stays alive so the peripheral keeps its clock.
    let (tx, _rx) = uart.split();
    modem_uart::listen();

    let engine = AtEngine::new(UartTransport::new(tx), SysTickClock, &MODEM_RX)
        .with_observer(ExchangeLog);
    let node = cycle_task::Node::new(Modem::new(engine), NodeConfig::from_build_env());

    defmt::info!("sensor node up, sysclk={}Hz", SYSCLK_HZ);
    node.run()
}

#[exception]
unsafe fn HardFault(_frame: &ExceptionFrame) -> ! {
    loop {
        cortex_m::asm::nop();
    }
}
