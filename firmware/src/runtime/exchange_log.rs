use defmt::Display2Format;
use node_core::at::{AtError, ExchangeObserver};

/// Echoes every AT exchange to the debug log.
#[derive(Copy, Clone, Default)]
pub struct ExchangeLog;

impl ExchangeObserver for ExchangeLog {
    fn on_exchange(&mut self, command: &str, reply: &[u8], outcome: Result<(), AtError>) {
        defmt::debug!(">> {=str}", command);
        for line in reply
            .split(|&byte| byte == b'\n')
            .map(<[u8]>::trim_ascii)
            .filter(|line| !line.is_empty())
        {
            defmt::debug!("<< {=[u8]:a}", line);
        }
        if let Err(error) = outcome {
            defmt::warn!("at: {=str} failed: {}", command, Display2Format(&error));
        }
    }
}
