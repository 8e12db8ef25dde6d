//! USART1 link to the WiFi modem.
//!
//! Transmission goes through Embassy's blocking driver. Reception is a bare
//! RXNE interrupt feeding [`MODEM_RX`], which the AT engine reads by mark.

use embassy_stm32::interrupt;
use embassy_stm32::interrupt::InterruptExt;
use embassy_stm32::mode::Blocking;
use embassy_stm32::pac;
use embassy_stm32::usart::UartTx;
use node_core::at::{TransmitError, Transport};
use node_core::rx::RxRing;

/// Bytes received from the modem.
pub static MODEM_RX: RxRing = RxRing::new();

pub struct UartTransport {
    tx: UartTx<'static, Blocking>,
}

impl UartTransport {
    #[must_use]
    pub fn new(tx: UartTx<'static, Blocking>) -> Self {
        Self { tx }
    }
}

impl Transport for UartTransport {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), TransmitError> {
        self.tx.blocking_write(bytes).map_err(|_| TransmitError)?;
        self.tx.blocking_flush().map_err(|_| TransmitError)
    }
}

/// Enables the receive interrupt on an already configured USART1.
pub fn listen() {
    clear_receive_errors();
    pac::USART1.cr1().modify(|w| w.set_rxneie(true));
    interrupt::USART1.unpend();
    // SAFETY: the handler only pushes into the receive ring.
    unsafe { interrupt::USART1.enable() };
}

/// Gates the whole peripheral; the configuration survives.
pub fn set_enabled(enabled: bool) {
    pac::USART1.cr1().modify(|w| w.set_ue(enabled));
}

/// Clears an overrun left by bytes that arrived while reception was masked.
pub fn clear_receive_errors() {
    if pac::USART1.isr().read().ore() {
        pac::USART1.icr().write(|w| w.set_ore(true));
    }
}

#[interrupt]
fn USART1() {
    while pac::USART1.isr().read().rxne() {
        let [byte, ..] = pac::USART1.rdr().read().rdr().to_le_bytes();
        MODEM_RX.push(byte);
    }
    clear_receive_errors();
}
