mod support;

use node_core::calendar::{
    Calendar, CalendarDate, CalendarError, CalendarTime, HourFormat, LOCK_KEYS, PRESCALER_ASYNC,
    PRESCALER_SYNC, TimeOfDay, UNLOCK_KEYS,
};
use node_core::config::DEFAULT_CALENDAR;

use support::FakeRtc;

fn locked_after_unlock(keys: &[u8]) -> bool {
    keys.chunks(2)
        .collect::<Vec<_>>()
        .chunks(2)
        .all(|pair| pair == [&UNLOCK_KEYS[..], &LOCK_KEYS[..]])
}

#[test]
fn init_brings_up_lsi_and_commits_the_default_calendar() {
    let mut calendar = Calendar::new(FakeRtc::default());

    let report = calendar.init(&DEFAULT_CALENDAR).expect("init");

    assert!(report.is_complete());
    let regs = calendar.registers_mut();
    assert!(regs.backup_access);
    assert_eq!(regs.backup_resets, 1);
    assert!(regs.lsi_source);
    assert_eq!(regs.prescaler, Some((PRESCALER_ASYNC, PRESCALER_SYNC)));
    assert_eq!(regs.time, 0x0020_4500);
    assert_eq!(regs.date, 0x0024_E908);
    assert!(!regs.init_requested);
    assert_eq!(regs.keys, [0xCA, 0x53, 0xFE, 0x64]);

    assert_eq!(calendar.now(), DEFAULT_CALENDAR);
}

#[test]
fn invalid_hour_keeps_previous_time_but_commits_the_date() {
    let mut calendar = Calendar::new(FakeRtc::default());
    calendar.init(&DEFAULT_CALENDAR).expect("init");
    let before = calendar.registers_mut().time;

    let update = CalendarTime::new(CalendarDate::new(3, 10, 2, 24), TimeOfDay::new(24, 0, 0));
    let report = calendar.set(&update).expect("init mode");

    assert_eq!(report.time, Err(CalendarError::InvalidTime));
    assert_eq!(report.date, Ok(()));
    assert_eq!(report.into_result(), Err(CalendarError::InvalidTime));
    assert_eq!(calendar.registers_mut().time, before);
    assert_eq!(calendar.read_date(), CalendarDate::new(3, 10, 2, 24));
}

#[test]
fn rejected_time_leaves_the_hour_format_alone() {
    let mut calendar = Calendar::new(FakeRtc::default());
    calendar.init(&DEFAULT_CALENDAR).expect("init");

    let mut update = CalendarTime::new(CalendarDate::new(3, 10, 2, 24), TimeOfDay::new(0, 0, 0));
    update.format = HourFormat::Twelve;
    let report = calendar.set(&update).expect("init mode");

    assert_eq!(report.time, Err(CalendarError::InvalidTime));
    assert_eq!(report.date, Ok(()));
    assert!(!calendar.registers_mut().twelve_hour);
    assert_eq!(calendar.now().format, HourFormat::TwentyFour);
}

#[test]
fn standalone_time_update_validates_before_unlocking() {
    let mut calendar = Calendar::new(FakeRtc::default());

    assert_eq!(
        calendar.set_time(&TimeOfDay::new(24, 0, 0)),
        Err(CalendarError::InvalidTime)
    );
    assert!(calendar.registers_mut().keys.is_empty());

    calendar.set_time(&TimeOfDay::new(7, 30, 15)).expect("set");
    assert_eq!(calendar.read_time(), TimeOfDay::new(7, 30, 15));
    assert!(locked_after_unlock(&calendar.registers_mut().keys));
}

#[test]
fn weekday_seven_is_accepted() {
    let mut calendar = Calendar::new(FakeRtc::default());
    calendar
        .set_date(&CalendarDate::new(7, 9, 8, 24))
        .expect("sunday");
    assert_eq!(calendar.read_date().weekday, 7);
    assert_eq!(
        calendar.set_date(&CalendarDate::new(8, 9, 8, 24)),
        Err(CalendarError::InvalidDate)
    );
}

#[test]
fn lsi_that_never_starts_is_reported() {
    let mut calendar = Calendar::new(FakeRtc {
        lsi_never_ready: true,
        ..FakeRtc::default()
    });

    assert_eq!(
        calendar.init(&DEFAULT_CALENDAR),
        Err(CalendarError::ClockSourceTimeout)
    );
    assert!(calendar.registers_mut().keys.is_empty());
}

#[test]
fn init_mode_timeout_relocks_the_registers() {
    let mut calendar = Calendar::new(FakeRtc {
        init_never_ready: true,
        ..FakeRtc::default()
    });

    assert_eq!(
        calendar.init(&DEFAULT_CALENDAR),
        Err(CalendarError::InitModeTimeout)
    );
    let regs = calendar.registers_mut();
    assert!(!regs.init_requested);
    assert_eq!(regs.keys, [0xCA, 0x53, 0xFE, 0x64]);
    assert_eq!(regs.time, 0);
}

#[test]
fn alarm_wraps_past_midnight() {
    let mut calendar = Calendar::new(FakeRtc::default());
    calendar
        .set_time(&TimeOfDay::new(23, 59, 50))
        .expect("set");

    let alarm = calendar.schedule_alarm(20).expect("alarm");

    assert_eq!(alarm, TimeOfDay::new(0, 0, 10));
    let regs = calendar.registers_mut();
    assert_eq!(regs.alarm, 0x8000_0010);
    assert!(regs.alarm_enabled);
    assert!(regs.alarm_line_enabled);
    assert!(!regs.alarm_flag);
    assert!(locked_after_unlock(&regs.keys));
}

#[test]
fn default_sleep_interval_lands_half_an_hour_later() {
    let mut calendar = Calendar::new(FakeRtc::default());
    calendar.init(&DEFAULT_CALENDAR).expect("init");

    let alarm = calendar.schedule_alarm(1_800).expect("alarm");

    assert_eq!(alarm, TimeOfDay::new(21, 15, 0));
    assert_eq!(calendar.registers_mut().alarm, 0x8021_1500);
}

#[test]
fn unwritable_alarm_leaves_previous_alarm_in_place() {
    let mut calendar = Calendar::new(FakeRtc {
        alarm: 0x8012_3456,
        alarm_locked: true,
        ..FakeRtc::default()
    });

    assert_eq!(
        calendar.schedule_alarm(60),
        Err(CalendarError::AlarmNotWritable)
    );
    let regs = calendar.registers_mut();
    assert_eq!(regs.alarm, 0x8012_3456);
    assert!(!regs.alarm_line_enabled);
    assert_eq!(regs.keys, [0xCA, 0x53, 0xFE, 0x64]);
}

#[test]
fn acknowledging_clears_flag_and_line() {
    let mut calendar = Calendar::new(FakeRtc {
        alarm_flag: true,
        alarm_line_pending: true,
        ..FakeRtc::default()
    });

    assert!(calendar.acknowledge_alarm());
    assert!(!calendar.registers_mut().alarm_flag);
    assert!(!calendar.registers_mut().alarm_line_pending);
    assert!(!calendar.acknowledge_alarm());
}
