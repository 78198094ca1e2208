use fibpool_core::{Error, Result};
use std::io::{self, BufRead};
use std::num::NonZeroUsize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// A validated console line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Enqueue a request for this value.
    Submit(i64),
    /// Start the shutdown handshake.
    Exit,
}

/// Classifies one console line, without its line ending.
///
/// The exit keyword must match the whole line exactly. Any other line must
/// be a decimal integer greater than zero that fits in an `i64`, optionally
/// surrounded by whitespace; signs are not accepted.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for every line that is neither.
pub fn classify(line: &str, exit_keyword: &str) -> Result<Command> {
    if line.strip_suffix('\r').unwrap_or(line) == exit_keyword {
        return Ok(Command::Exit);
    }
    parse_value(line).map(Command::Submit)
}

/// Parses a request value: a positive decimal integer, surrounding
/// whitespace ignored.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the line is anything else.
pub fn parse_value(line: &str) -> Result<i64> {
    parse_positive(line.trim())
}

/// Parses the worker count typed at the startup prompt.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the line is not an integer greater
/// than zero.
pub fn parse_worker_count(line: &str) -> Result<NonZeroUsize> {
    let input = line.trim();
    let value = parse_positive(input)?;
    usize::try_from(value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| invalid(input, "out of range"))
}

fn parse_positive(input: &str) -> Result<i64> {
    if input.is_empty() {
        return Err(invalid(input, "empty input"));
    }
    if input.contains(char::REPLACEMENT_CHARACTER) {
        return Err(invalid(input, "not valid UTF-8"));
    }
    if !input.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(input, "not a number"));
    }
    match input.parse::<i64>() {
        Ok(0) => Err(invalid(input, "must be greater than 0")),
        Ok(value) => Ok(value),
        Err(_) => Err(invalid(input, "out of range")),
    }
}

fn invalid(input: &str, reason: &str) -> Error {
    Error::InvalidInput {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

/// Reads one line without its line ending, or `None` at end of input.
///
/// Bytes that are not valid UTF-8 are replaced with
/// [`char::REPLACEMENT_CHARACTER`], so such a line still arrives and is
/// rejected by [`classify`] instead of ending the session.
///
/// # Errors
///
/// Returns the underlying read error.
pub fn read_console_line<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }

    let mut line: &[u8] = buf;
    if let Some(rest) = line.strip_suffix(b"\n") {
        line = rest;
    }
    if let Some(rest) = line.strip_suffix(b"\r") {
        line = rest;
    }
    Ok(Some(String::from_utf8_lossy(line).into_owned()))
}

/// Streams stdin line by line.
///
/// Lines are read on a dedicated OS thread and handed over through a bounded
/// channel, so a blocked read never holds up the runtime and never delays
/// process exit. The stream ends at end-of-input or after the first read
/// error.
///
/// # Errors
///
/// Returns an error if the reader thread cannot be started.
pub fn stdin_lines() -> io::Result<ReceiverStream<io::Result<String>>> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("console-input".into())
        .spawn(move || {
            let mut stdin = io::stdin().lock();
            let mut buf = Vec::new();
            loop {
                let line = match read_console_line(&mut stdin, &mut buf) {
                    Ok(Some(line)) => Ok(line),
                    Ok(None) => break,
                    Err(e) => Err(e),
                };
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn classifies_requests_and_exit() {
        assert_eq!(classify("5", "exit").unwrap(), Command::Submit(5));
        assert_eq!(classify("  42 \r", "exit").unwrap(), Command::Submit(42));
        assert_eq!(classify("exit", "exit").unwrap(), Command::Exit);
        assert_eq!(classify("quit\r", "quit").unwrap(), Command::Exit);
        assert_eq!(
            classify("9223372036854775807", "exit").unwrap(),
            Command::Submit(i64::MAX)
        );
    }

    #[test]
    fn rejects_everything_else() {
        let lines = [
            "0", "000", "abc", "", "   ", "-3", "+3", "1.5", "1e3", "EXIT", "exit now", " exit",
            "exit ",
        ];
        for line in lines {
            let err = classify(line, "exit").unwrap_err();
            assert!(matches!(err, Error::InvalidInput { .. }), "{line:?}");
        }
    }

    #[test]
    fn rejects_overflow() {
        let err = classify("9223372036854775808", "exit").unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn undecodable_lines_arrive_and_are_rejected() {
        let mut reader = Cursor::new(b"3\n\xff\xfe\n5\r\nexit".to_vec());
        let mut buf = Vec::new();
        let lines: Vec<String> =
            std::iter::from_fn(|| read_console_line(&mut reader, &mut buf).unwrap()).collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "3");
        assert_eq!(lines[2], "5");
        assert_eq!(lines[3], "exit");

        let err = classify(&lines[1], "exit").unwrap_err();
        assert!(err.to_string().contains("not valid UTF-8"));
        assert_eq!(classify(&lines[2], "exit").unwrap(), Command::Submit(5));
    }

    #[test]
    fn parses_request_values() {
        assert_eq!(parse_value(" 25\n").unwrap(), 25);
        assert!(parse_value("25x").is_err());
        assert!(parse_value("0").is_err());
    }

    #[test]
    fn parses_worker_counts() {
        assert_eq!(parse_worker_count("4\n").unwrap().get(), 4);
        assert!(parse_worker_count("0").is_err());
        assert!(parse_worker_count("two").is_err());
        assert!(parse_worker_count("").is_err());
    }
}
