mod esp32;
mod hardware;
mod session;

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use esp32::{Fault, FaultKind};
use hardware::Host;
use session::{Options, Session};

const USAGE: &str = "Usage: node-emulator [--cycles <n>] [--fail <command>[:count]] \
[--silent <command>[:count]] [--max-retries <n>] [--sleep-secs <n>] [--port <n>] \
[--transcript <path>] [--verbose]";

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });
    let cycles = options.cycles;

    let host = Host::new();
    let mut session = Session::new(&host, options)?;
    let stdout = io::stdout();
    let mut writer = stdout.lock();

    print_lines(&mut writer, &session.boot()?)?;
    for number in 1..=cycles {
        print_lines(&mut writer, &session.run_cycle(number)?)?;
    }
    print_lines(&mut writer, &session.summary(cycles)?)?;

    Ok(())
}

fn print_lines(writer: &mut impl Write, lines: &[String]) -> io::Result<()> {
    for line in lines {
        writeln!(writer, "{line}")?;
    }
    writer.flush()
}

fn parse_options(args: impl IntoIterator<Item = String>) -> Result<Options, String> {
    let mut options = Options::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => {
                (flag.to_string(), Some(value.to_string()))
            }
            _ => (arg, None),
        };
        if flag == "--verbose" || flag == "-v" {
            options.verbose = true;
            continue;
        }

        let value = match inline {
            Some(value) => value,
            None => args
                .next()
                .ok_or_else(|| format!("Expected value after {flag}"))?,
        };
        match flag.as_str() {
            "--cycles" => options.cycles = parse_number(&flag, &value)?,
            "--fail" => options.faults.push(Fault::parse(FaultKind::Error, &value)?),
            "--silent" => options.faults.push(Fault::parse(FaultKind::Silent, &value)?),
            "--max-retries" => options.config.max_retries = parse_number(&flag, &value)?,
            "--sleep-secs" => options.config.sleep_interval_secs = parse_number(&flag, &value)?,
            "--port" => options.config.server_port = parse_number(&flag, &value)?,
            "--transcript" => options.transcript = Some(PathBuf::from(value)),
            _ => return Err(format!("Unknown option `{flag}`")),
        }
    }

    Ok(options)
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid value `{value}` for {flag}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, String> {
        parse_options(args.iter().map(|arg| (*arg).to_string()))
    }

    #[test]
    fn accepts_both_value_forms() {
        let options =
            parse(&["--cycles=3", "--silent", "AT+CIPSNTPTIME?:2", "-v"]).expect("options");
        assert_eq!(options.cycles, 3);
        assert!(options.verbose);
        assert_eq!(options.faults.len(), 1);
        assert_eq!(options.faults[0].remaining, 2);
        assert_eq!(options.faults[0].kind, FaultKind::Silent);
    }

    #[test]
    fn overrides_configuration() {
        let options =
            parse(&["--max-retries", "2", "--sleep-secs=60", "--port=9000"]).expect("options");
        assert_eq!(options.config.max_retries, 2);
        assert_eq!(options.config.sleep_interval_secs, 60);
        assert_eq!(options.config.server_port, 9000);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&["--cycles"]).is_err());
        assert!(parse(&["--cycles=many"]).is_err());
        assert!(parse(&["--port=70000"]).is_err());
        assert!(parse(&["--colour"]).is_err());
    }
}
