mod support;

use std::cell::{Cell, RefCell};

use node_core::calendar::{Calendar, CalendarError, TimeOfDay};
use node_core::power::{AlarmWake, PowerControl, PowerSequencer, TickGate, sleep_cycle};

use support::FakeRtc;

type Journal = RefCell<Vec<&'static str>>;

/// Records power calls; each stop-mode entry may deliver the RTC interrupt.
struct Board<'a> {
    journal: &'a Journal,
    wake: &'a AlarmWake,
    /// Stop-mode entries that end on something other than the alarm.
    spurious_wakes: Cell<u32>,
}

impl PowerControl for &Board<'_> {
    fn quiesce_peripherals(&mut self) {
        self.journal.borrow_mut().push("quiesce");
    }
    fn restore_clocks(&mut self) {
        self.journal.borrow_mut().push("clocks");
    }
    fn resume_peripherals(&mut self) {
        self.journal.borrow_mut().push("resume");
    }
    fn enter_stop_mode(&mut self) {
        self.journal.borrow_mut().push("stop");
        let spurious = self.spurious_wakes.get();
        if spurious > 0 {
            self.spurious_wakes.set(spurious - 1);
            return;
        }
        let mut calendar = Calendar::new(FakeRtc {
            alarm_flag: true,
            alarm_line_pending: true,
            ..FakeRtc::default()
        });
        let mut sequencer = PowerSequencer::new(*self, Tick(self.journal));
        assert!(self.wake.on_interrupt(&mut calendar, &mut sequencer));
    }
}

struct Tick<'a>(&'a Journal);

impl TickGate for Tick<'_> {
    fn disable_tick(&mut self) {
        self.0.borrow_mut().push("tick off");
    }
    fn enable_tick(&mut self) {
        self.0.borrow_mut().push("tick on");
    }
}

fn calendar_at_noon() -> Calendar<FakeRtc> {
    Calendar::new(FakeRtc {
        time: 0x0012_0000,
        ..FakeRtc::default()
    })
}

#[test]
fn alarm_interrupt_ends_the_sleep() {
    let journal = Journal::default();
    let wake = AlarmWake::new();
    let board = Board {
        journal: &journal,
        wake: &wake,
        spurious_wakes: Cell::new(0),
    };
    let mut sequencer = PowerSequencer::new(&board, Tick(&journal));
    let mut calendar = calendar_at_noon();

    let alarm = sleep_cycle(&mut sequencer, &mut calendar, &wake, 90);

    assert_eq!(alarm, Ok(TimeOfDay::new(12, 1, 30)));
    assert_eq!(
        journal.borrow().as_slice(),
        &["tick off", "quiesce", "tick off", "stop", "clocks", "resume", "tick on"]
    );
    assert!(calendar.registers_mut().alarm_line_enabled);
    assert!(!wake.take());
}

#[test]
fn other_interrupts_put_the_node_back_to_sleep() {
    let journal = Journal::default();
    let wake = AlarmWake::new();
    let board = Board {
        journal: &journal,
        wake: &wake,
        spurious_wakes: Cell::new(2),
    };
    let mut sequencer = PowerSequencer::new(&board, Tick(&journal));
    let mut calendar = calendar_at_noon();

    assert!(sleep_cycle(&mut sequencer, &mut calendar, &wake, 60).is_ok());

    let stops = journal.borrow().iter().filter(|call| **call == "stop").count();
    assert_eq!(stops, 3);
    assert_eq!(journal.borrow().last(), Some(&"tick on"));
}

#[test]
fn unarmed_alarm_keeps_the_node_awake() {
    let journal = Journal::default();
    let wake = AlarmWake::new();
    let board = Board {
        journal: &journal,
        wake: &wake,
        spurious_wakes: Cell::new(0),
    };
    let mut sequencer = PowerSequencer::new(&board, Tick(&journal));
    let mut calendar = Calendar::new(FakeRtc {
        alarm_locked: true,
        ..FakeRtc::default()
    });

    let alarm = sleep_cycle(&mut sequencer, &mut calendar, &wake, 60);

    assert_eq!(alarm, Err(CalendarError::AlarmNotWritable));
    assert_eq!(journal.borrow().as_slice(), &["tick off", "tick on"]);
}

#[test]
fn interrupt_without_alarm_flag_is_ignored() {
    let journal = Journal::default();
    let wake = AlarmWake::new();
    let board = Board {
        journal: &journal,
        wake: &wake,
        spurious_wakes: Cell::new(0),
    };
    let mut sequencer = PowerSequencer::new(&board, Tick(&journal));
    let mut calendar = Calendar::new(FakeRtc {
        alarm_line_pending: true,
        ..FakeRtc::default()
    });

    assert!(!wake.on_interrupt(&mut calendar, &mut sequencer));
    assert!(journal.borrow().is_empty());
    assert!(calendar.registers_mut().alarm_line_pending);
    assert!(!wake.take());
}
