#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use node_core::at::{TransmitError, Transport};
use node_core::rx::RxRing;
use node_core::time::Monotonic;

/// Manual clock plus the receive ring it feeds.
///
/// Every `now_ms` call advances time by one millisecond and publishes any
/// scheduled bytes that are due, the way the receive interrupt would.
pub struct Bench {
    pub rx: RxRing,
    now: Cell<u32>,
    pending: RefCell<Vec<(u32, Vec<u8>)>>,
}

impl Bench {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(now: u32) -> Self {
        Self {
            rx: RxRing::new(),
            now: Cell::new(now),
            pending: RefCell::new(Vec::new()),
        }
    }

    pub fn current(&self) -> u32 {
        self.now.get()
    }

    /// Schedules `bytes` to arrive `delay_ms` from now.
    pub fn deliver_after(&self, delay_ms: u32, bytes: &[u8]) {
        if delay_ms == 0 {
            self.rx.extend(bytes);
        } else {
            let due = self.now.get().wrapping_add(delay_ms);
            self.pending.borrow_mut().push((due, bytes.to_vec()));
        }
    }

    fn publish_due(&self) {
        let now = self.now.get();
        let mut pending = self.pending.borrow_mut();
        pending.retain(|(due, bytes)| {
            if now.wrapping_sub(*due) < u32::MAX / 2 {
                self.rx.extend(bytes);
                false
            } else {
                true
            }
        });
    }
}

impl Monotonic for Bench {
    fn now_ms(&self) -> u32 {
        self.now.set(self.now.get().wrapping_add(1));
        self.publish_due();
        self.now.get()
    }
}

/// One scheduled answer to a command line.
pub struct Answer {
    pub delay_ms: u32,
    pub bytes: Vec<u8>,
}

impl Answer {
    pub fn now(text: &str) -> Self {
        Self::after(0, text)
    }

    pub fn after(delay_ms: u32, text: &str) -> Self {
        Self {
            delay_ms,
            bytes: text.as_bytes().to_vec(),
        }
    }

    pub fn silence() -> Self {
        Self::now("")
    }
}

type Handler = Box<dyn FnMut(&str) -> Vec<Answer>>;

/// Transport that records command lines and answers through a handler.
pub struct ScriptedModem<'b> {
    bench: &'b Bench,
    handler: Handler,
    line: Vec<u8>,
    pub sent: Vec<String>,
}

impl<'b> ScriptedModem<'b> {
    pub fn new(bench: &'b Bench, handler: impl FnMut(&str) -> Vec<Answer> + 'static) -> Self {
        Self {
            bench,
            handler: Box::new(handler),
            line: Vec::new(),
            sent: Vec::new(),
        }
    }

    /// Answers commands in order from `answers`; later commands get silence.
    pub fn queued(bench: &'b Bench, answers: Vec<Answer>) -> Self {
        let mut answers: VecDeque<Answer> = answers.into();
        Self::new(bench, move |_| answers.pop_front().into_iter().collect())
    }
}

impl Transport for ScriptedModem<'_> {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), TransmitError> {
        self.line.extend_from_slice(bytes);
        if self.line.ends_with(b"\r\n") {
            let text = String::from_utf8_lossy(&self.line[..self.line.len() - 2]).into_owned();
            self.line.clear();
            for answer in (self.handler)(&text) {
                self.bench.deliver_after(answer.delay_ms, &answer.bytes);
            }
            self.sent.push(text);
        }
        Ok(())
    }
}

/// Register bank standing in for the RTC block.
#[derive(Debug, Default)]
pub struct FakeRtc {
    pub keys: Vec<u8>,
    pub backup_access: bool,
    pub backup_resets: u32,
    pub lsi_enabled: bool,
    pub lsi_never_ready: bool,
    pub lsi_source: bool,
    pub init_requested: bool,
    pub init_never_ready: bool,
    pub init_entries: u32,
    pub prescaler: Option<(u8, u16)>,
    pub twelve_hour: bool,
    pub time: u32,
    pub date: u32,
    pub alarm: u32,
    pub alarm_enabled: bool,
    pub alarm_locked: bool,
    pub alarm_flag: bool,
    pub alarm_line_enabled: bool,
    pub alarm_line_pending: bool,
}

impl node_core::calendar::RtcRegisters for FakeRtc {
    fn enable_backup_access(&mut self) {
        self.backup_access = true;
    }
    fn reset_backup_domain(&mut self) {
        self.backup_resets += 1;
        self.time = 0;
        self.date = 0x0000_2101;
    }
    fn enable_lsi(&mut self) {
        self.lsi_enabled = true;
    }
    fn lsi_ready(&mut self) -> bool {
        self.lsi_enabled && !self.lsi_never_ready
    }
    fn select_lsi_clock(&mut self) {
        self.lsi_source = true;
    }
    fn write_protect_key(&mut self, key: u8) {
        self.keys.push(key);
    }
    fn enter_init_mode(&mut self) {
        self.init_requested = true;
        self.init_entries += 1;
    }
    fn init_mode_active(&mut self) -> bool {
        self.init_requested && !self.init_never_ready
    }
    fn exit_init_mode(&mut self) {
        self.init_requested = false;
    }
    fn set_prescaler(&mut self, asynchronous: u8, synchronous: u16) {
        self.prescaler = Some((asynchronous, synchronous));
    }
    fn set_hour_format(&mut self, format: node_core::calendar::HourFormat) {
        self.twelve_hour = format == node_core::calendar::HourFormat::Twelve;
    }
    fn read_time(&mut self) -> u32 {
        self.time
    }
    fn write_time(&mut self, packed: u32) {
        assert!(self.init_requested, "time written outside init mode");
        self.time = packed;
    }
    fn read_date(&mut self) -> u32 {
        self.date
    }
    fn write_date(&mut self, packed: u32) {
        assert!(self.init_requested, "date written outside init mode");
        self.date = packed;
    }
    fn disable_alarm(&mut self) {
        self.alarm_enabled = false;
    }
    fn alarm_writable(&mut self) -> bool {
        !self.alarm_enabled && !self.alarm_locked
    }
    fn write_alarm(&mut self, packed: u32) {
        self.alarm = packed;
    }
    fn alarm_pending(&mut self) -> bool {
        self.alarm_flag
    }
    fn clear_alarm_flag(&mut self) {
        self.alarm_flag = false;
    }
    fn enable_alarm(&mut self) {
        self.alarm_enabled = true;
    }
    fn enable_alarm_line(&mut self) {
        self.alarm_line_enabled = true;
    }
    fn clear_alarm_line(&mut self) {
        self.alarm_line_pending = false;
    }
}
