mod support;

use node_core::at::{
    AtEngine, AtError, Command, ExchangeObserver, Reply, ResponseSchema, ScanError, Segment,
};
use node_core::commands;

use support::{Answer, Bench, ScriptedModem};

const STATE: ResponseSchema = ResponseSchema::new("+CWSTATE:", &[Segment::int("state")]);

#[test]
fn terminator_before_timeout_returns_fields() {
    let bench = Bench::new();
    let transport = ScriptedModem::new(&bench, |_| {
        vec![
            Answer::after(3, "+CWSTATE:2,\"lab\"\r\n"),
            Answer::after(6, "\r\nOK\r\n"),
        ]
    });
    let mut engine = AtEngine::new(transport, &bench, &bench.rx);

    let response = engine
        .execute(&Command::new(
            "AT+CWSTATE?",
            Reply::ok(100).with_schema(&STATE),
        ))
        .expect("reply");

    assert_eq!(response.fields().int("state"), Some(2));
    assert!(response.contains("OK"));
    assert_eq!(engine.transport_mut().sent, vec!["AT+CWSTATE?".to_string()]);
    assert!(bench.current() < 100);
}

#[test]
fn missing_terminator_times_out_within_one_poll() {
    let bench = Bench::starting_at(u32::MAX - 20);
    let transport = ScriptedModem::queued(&bench, vec![Answer::now("busy p...\r\n")]);
    let mut engine = AtEngine::new(transport, &bench, &bench.rx);

    let start = bench.current();
    let result = engine.execute(&Command::new("AT", Reply::ok(50)));
    let elapsed = bench.current().wrapping_sub(start);

    assert_eq!(result, Err(AtError::Timeout));
    assert!(elapsed >= 50, "returned after {elapsed} ms");
    assert!(elapsed <= 52, "returned after {elapsed} ms");
}

#[test]
fn bytes_before_the_command_are_not_part_of_the_reply() {
    let bench = Bench::new();
    bench.rx.extend(b"+CWSTATE:4\r\nOK\r\n");
    let transport = ScriptedModem::queued(&bench, vec![Answer::after(2, "+CWSTATE:2\r\nOK\r\n")]);
    let mut engine = AtEngine::new(transport, &bench, &bench.rx);

    let response = engine
        .execute(&commands::STATION_STATE_QUERY)
        .expect("reply");

    assert_eq!(response.fields().int("state"), Some(2));
    assert!(!response.text().contains("+CWSTATE:4"));
}

#[test]
fn stale_terminator_does_not_complete_the_next_exchange() {
    let bench = Bench::new();
    bench.rx.extend(b"OK\r\n");
    let transport = ScriptedModem::queued(&bench, vec![Answer::silence()]);
    let mut engine = AtEngine::new(transport, &bench, &bench.rx);

    assert_eq!(
        engine.execute(&Command::new("AT", Reply::ok(20))),
        Err(AtError::Timeout)
    );
}

#[test]
fn error_reply_fails_before_the_timeout() {
    let bench = Bench::new();
    let transport = ScriptedModem::queued(&bench, vec![Answer::after(4, "\r\nERROR\r\n")]);
    let mut engine = AtEngine::new(transport, &bench, &bench.rx);

    let result = engine.execute(&Command::new("AT+CIPCLOSE", Reply::ok(2_000)));

    assert_eq!(result, Err(AtError::Failed));
    assert!(bench.current() < 100);
}

#[test]
fn join_fails_fast_on_either_rejection() {
    for reply in ["\r\nERROR\r\n", "+CWJAP:1\r\n\r\nFAIL\r\n"] {
        let bench = Bench::new();
        let transport = ScriptedModem::queued(&bench, vec![Answer::after(4, reply)]);
        let mut engine = AtEngine::new(transport, &bench, &bench.rx);
        let mut line = commands::CommandLine::new();

        let command = commands::join_access_point(&mut line, "lab", "secret").expect("fits");
        let result = engine.execute(&command);

        assert_eq!(result, Err(AtError::Failed), "{reply:?}");
        assert!(bench.current() < 100, "{reply:?}");
    }
}

#[test]
fn marker_missing_from_completed_reply_is_a_mismatch() {
    let bench = Bench::new();
    let transport = ScriptedModem::queued(&bench, vec![Answer::now("\r\nOK\r\n")]);
    let mut engine = AtEngine::new(transport, &bench, &bench.rx);

    let result = engine.execute(&commands::LINK_STATUS_QUERY);

    assert_eq!(result, Err(AtError::Mismatch(ScanError::MissingMarker)));
}

#[test]
fn send_prompt_terminator_overrides_ok() {
    let bench = Bench::new();
    let transport = ScriptedModem::queued(&bench, vec![Answer::after(1, "\r\nOK\r\n\r\n>")]);
    let mut engine = AtEngine::new(transport, &bench, &bench.rx);
    let mut line = commands::CommandLine::new();

    let command = commands::announce_send(&mut line, 34).expect("fits");
    let response = engine.execute(&command).expect("prompt");

    assert!(response.contains(">"));
}

#[test]
fn oversized_command_is_rejected_without_transmitting() {
    let bench = Bench::new();
    let transport = ScriptedModem::queued(&bench, vec![Answer::now("OK\r\n")]);
    let mut engine = AtEngine::new(transport, &bench, &bench.rx);
    let text = "A".repeat(node_core::at::MAX_COMMAND_LEN);

    let result = engine.execute(&Command::new(&text, Reply::ok(100)));

    assert_eq!(result, Err(AtError::CommandTooLong));
    assert!(engine.transport_mut().sent.is_empty());
}

#[derive(Default)]
struct Transcript {
    lines: Vec<(String, String, bool)>,
}

impl ExchangeObserver for Transcript {
    fn on_exchange(&mut self, command: &str, reply: &[u8], outcome: Result<(), AtError>) {
        self.lines.push((
            command.to_string(),
            String::from_utf8_lossy(reply).into_owned(),
            outcome.is_ok(),
        ));
    }
}

#[test]
fn observer_sees_failed_exchanges_too() {
    let bench = Bench::new();
    let transport = ScriptedModem::queued(
        &bench,
        vec![Answer::now("\r\nOK\r\n"), Answer::now("\r\nERROR\r\n")],
    );
    let mut engine =
        AtEngine::new(transport, &bench, &bench.rx).with_observer(Transcript::default());

    engine.execute(&commands::PROBE).expect("ok");
    assert!(engine.execute(&commands::CLOSE_SOCKET).is_err());

    let lines = &engine.observer().lines;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].0, "AT");
    assert!(lines[0].2);
    assert_eq!(lines[1].0, "AT+CIPCLOSE");
    assert!(lines[1].1.contains("ERROR"));
    assert!(!lines[1].2);
}
