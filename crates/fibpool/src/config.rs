use anyhow::bail;
use clap::{Parser, Subcommand, ValueEnum};
use core::num::NonZeroUsize;
use fibpool_core::render::DEFAULT_DISPLAY_CAP;

/// Runtime configuration for the `fibpool` binary.
///
/// All values are parsed from CLI arguments or environment variables (a `.env`
/// file is loaded first). Without a subcommand the binary runs the interactive
/// console; the `worker` and `sink` subcommands are how the process backend
/// launches its children and are not meant to be run by hand.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fibpool",
    version,
    about = "Dispatch Fibonacci requests from the console to a pool of workers"
)]
pub struct CliArgs {
    /// Number of worker units in the pool.
    ///
    /// When omitted, the console prompts for it and reads it as the first
    /// input line. Must be greater than 0.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS")]
    pub num_workers: Option<usize>,

    /// Execution-unit provider: OS threads or OS child processes.
    ///
    /// Environment variable: `FIBPOOL_BACKEND`
    #[arg(long, env = "FIBPOOL_BACKEND", value_enum, default_value_t = BackendKind::Thread)]
    pub backend: BackendKind,

    /// Console line that starts the shutdown handshake.
    ///
    /// Environment variable: `EXIT_KEYWORD`
    #[arg(long, env = "EXIT_KEYWORD", default_value_t = String::from("exit"))]
    pub exit_keyword: String,

    /// Characters of each result shown before the rest is elided.
    ///
    /// Environment variable: `DISPLAY_CAP`
    #[arg(long, env = "DISPLAY_CAP", default_value_t = DEFAULT_DISPLAY_CAP)]
    pub display_cap: usize,

    #[command(subcommand)]
    pub role: Option<Role>,
}

/// Which execution-unit provider hosts workers and the sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Threads sharing process memory.
    Thread,
    /// Child processes talking over pipes.
    Process,
}

/// Subcommands: `compute`, plus the hidden child roles launched by the
/// process backend.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Compute one Fibonacci number and print it in full.
    ///
    /// Reads the value from the first line of stdin when it is not given.
    Compute {
        #[arg(allow_hyphen_values = true)]
        value: Option<String>,
    },
    /// Run one worker over stdin/stdout.
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        id: usize,
    },
    /// Run the result sink over stdin, rendering to stdout.
    #[command(hide = true)]
    Sink {
        #[arg(long, default_value_t = DEFAULT_DISPLAY_CAP)]
        display_cap: usize,
    },
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub num_workers: Option<NonZeroUsize>,
    pub backend: BackendKind,
    pub exit_keyword: String,
    pub display_cap: usize,
}

impl TryFrom<CliArgs> for EngineConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let num_workers = match args.num_workers {
            None => None,
            Some(n) => match NonZeroUsize::new(n) {
                Some(n) => Some(n),
                None => bail!("NUM_WORKERS must be greater than 0"),
            },
        };

        if args.display_cap == 0 {
            bail!("DISPLAY_CAP must be greater than 0");
        }

        let exit_keyword = args.exit_keyword.trim().to_string();
        if exit_keyword.is_empty() {
            bail!("EXIT_KEYWORD must not be empty");
        }
        if exit_keyword.bytes().all(|b| b.is_ascii_digit()) {
            bail!("EXIT_KEYWORD ({exit_keyword}) must not be a number");
        }

        Ok(Self {
            num_workers,
            backend: args.backend,
            exit_keyword,
            display_cap: args.display_cap,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<EngineConfig> {
        let args = CliArgs::try_parse_from(core::iter::once("fibpool").chain(args.iter().copied()))?;
        EngineConfig::try_from(args)
    }

    #[test]
    fn defaults_to_threads_and_prompting() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.backend, BackendKind::Thread);
        assert_eq!(config.num_workers, None);
        assert_eq!(config.exit_keyword, "exit");
        assert_eq!(config.display_cap, DEFAULT_DISPLAY_CAP);
    }

    #[test]
    fn rejects_zero_workers() {
        let err = parse(&["--num-workers", "0"]).unwrap_err();
        assert!(err.to_string().contains("greater than 0"));
    }

    #[test]
    fn rejects_numeric_exit_keyword() {
        assert!(parse(&["--exit-keyword", "42"]).is_err());
        assert!(parse(&["--exit-keyword", "  "]).is_err());
    }

    #[test]
    fn parses_child_roles() {
        let args = CliArgs::try_parse_from(["fibpool", "worker", "--id", "3"]).unwrap();
        assert_eq!(args.role, Some(Role::Worker { id: 3 }));

        let args = CliArgs::try_parse_from(["fibpool", "sink", "--display-cap", "20"]).unwrap();
        assert_eq!(args.role, Some(Role::Sink { display_cap: 20 }));
    }

    #[test]
    fn parses_the_compute_command() {
        let args = CliArgs::try_parse_from(["fibpool", "compute", "25"]).unwrap();
        assert_eq!(args.role, Some(Role::Compute { value: Some("25".into()) }));

        let args = CliArgs::try_parse_from(["fibpool", "compute"]).unwrap();
        assert_eq!(args.role, Some(Role::Compute { value: None }));

        // Left for the value parser to reject with a proper message.
        let args = CliArgs::try_parse_from(["fibpool", "compute", "-3"]).unwrap();
        assert_eq!(args.role, Some(Role::Compute { value: Some("-3".into()) }));

        assert!(CliArgs::try_parse_from(["fibpool", "compute", "1", "2"]).is_err());
    }

    #[test]
    fn selects_process_backend() {
        let config = parse(&["--backend", "process", "--num-workers", "4"]).unwrap();
        assert_eq!(config.backend, BackendKind::Process);
        assert_eq!(config.num_workers.map(NonZeroUsize::get), Some(4));
    }
}
