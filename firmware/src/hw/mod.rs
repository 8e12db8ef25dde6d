//! STM32L053 bindings for the `node-core` hardware traits.
//!
//! Embassy brings up the clocks, pins and the USART; the handful of RTC,
//! power, reset-and-clock and EXTI bits the calendar and the sleep path need
//! are driven through the PAC's typed register accessors. Every handle here
//! is zero-sized so the interrupt handlers can build their own copies.

pub mod power;
pub mod rtc;
pub mod tick;
pub mod uart;

/// EXTI line wired to the RTC alarms.
pub const RTC_ALARM_LINE: usize = 17;
