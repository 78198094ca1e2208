use fibpool_core::{
    ResultItem, UnitId,
    channel::Inbox,
    render::{cap_display, console_line},
};
use std::io::Write;

/// Result sink loop: the sole consumer of the Result Channel.
///
/// Renders every [`ResultItem::Computed`] as one console line, capped at
/// `display_cap` characters, until [`ResultItem::Shutdown`] arrives. Each line
/// is written and flushed whole, so results are never interleaved mid-string.
///
/// # Errors
///
/// Returns an error if the Result Channel closes before the sentinel arrives
/// or the output cannot be written.
pub fn sink_loop<I, W>(
    unit: UnitId,
    results: &mut I,
    out: &mut W,
    display_cap: usize,
) -> fibpool_core::Result<()>
where
    I: Inbox<ResultItem>,
    W: Write,
{
    tracing::info!("{unit} initialized");

    loop {
        match results.pop()? {
            ResultItem::Shutdown => {
                tracing::debug!("{unit} received shutdown signal");
                return Ok(());
            }
            ResultItem::Computed { text, .. } => {
                let line = console_line(unit, &cap_display(&text, display_cap));
                writeln!(out, "{line}")?;
                out.flush()?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fibpool_core::channel::unbounded;

    #[test]
    fn renders_until_sentinel() {
        let (tx, mut rx) = unbounded();
        tx.send(ResultItem::Computed {
            source: 5,
            text: "Fibonacci(5) is 5".into(),
        })
        .unwrap();
        tx.send(ResultItem::Computed {
            source: 200,
            text: format!("Fibonacci(200) is {}", "9".repeat(80)),
        })
        .unwrap();
        tx.send(ResultItem::Shutdown).unwrap();
        tx.send(ResultItem::Computed {
            source: 1,
            text: "Fibonacci(1) is 1".into(),
        })
        .unwrap();

        let mut out = Vec::new();
        sink_loop(UnitId::Sink, &mut rx, &mut out, 80).unwrap();

        let out = String::from_utf8(out).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("sink @ "));
        assert!(lines[0].ends_with(": Fibonacci(5) is 5"));
        assert!(lines[1].ends_with("... (18 more digits)"));

        // Whatever follows the sentinel stays in the channel.
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn closed_channel_without_sentinel_is_an_error() {
        let (tx, mut rx) = unbounded::<ResultItem>();
        drop(tx);
        let mut out = Vec::new();
        assert!(sink_loop(UnitId::Sink, &mut rx, &mut out, 80).is_err());
    }
}
