use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Config;
use crate::telemetry::logging::{LogConfig, LogLevel};

mod app;

pub use app::run;

#[derive(Parser, Debug)]
#[command(
    name = "headset-remote",
    about = "Remote-control client for a 360° video headset",
    author,
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        global = true,
        env = "HEADSET_REMOTE_LOG_LEVEL",
        default_value_t = LogLevel::Info,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        global = true,
        env = "HEADSET_REMOTE_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the control session until Ctrl-C (default when no subcommand given)
    Run(RunArgs),
    /// Connect once, announce this device and disconnect
    Probe(ServerArgs),
    /// List restriction windows or evaluate a single position
    Restrictions(RestrictionArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    #[arg(
        long,
        value_name = "URI",
        help = "Control server endpoint, e.g. ws://192.168.0.12:8080"
    )]
    pub server: Option<String>,

    #[arg(long, value_name = "NAME", help = "Device name announced in CLIENT_INFO")]
    pub name: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    #[arg(long, value_name = "PATH", help = "Restriction windows (TOML)")]
    pub restrictions: Option<PathBuf>,

    #[arg(
        long = "max-attempts",
        value_name = "N",
        value_parser = clap::value_parser!(u32).range(1..),
        help = "Consecutive failures before automatic reconnection gives up"
    )]
    pub max_attempts: Option<u32>,
}

#[derive(Args, Debug, Clone)]
pub struct RestrictionArgs {
    #[arg(long, value_name = "PATH", help = "Restriction windows (TOML)")]
    pub restrictions: Option<PathBuf>,

    #[arg(long, value_name = "ID", requires = "at")]
    pub video: Option<String>,

    #[arg(long, value_name = "SECONDS", requires = "video")]
    pub at: Option<f64>,

    #[arg(long, help = "Print JSON instead of text")]
    pub json: bool,
}

impl ServerArgs {
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(server) = self.server.as_deref() {
            config = config.with_server(server);
        }
        if let Some(name) = self.name.as_deref() {
            config.device_name = name.to_string();
        }
        config
    }
}

impl RunArgs {
    pub fn apply(&self, config: Config) -> Config {
        let mut config = self.server.apply(config);
        if let Some(path) = self.restrictions.clone() {
            config.restrictions_path = Some(path);
        }
        if let Some(max_attempts) = self.max_attempts {
            config.backoff.max_attempts = max_attempts;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_overrides() {
        let cli = Cli::parse_from([
            "headset-remote",
            "--log-level",
            "debug",
            "run",
            "--server",
            "localhost:9001",
            "--max-attempts",
            "3",
        ]);
        assert_eq!(cli.logging.level, LogLevel::Debug);
        let Some(Command::Run(args)) = cli.command else {
            panic!("expected run subcommand");
        };
        let config = args.apply(Config::default());
        assert_eq!(config.server, "ws://127.0.0.1:9001");
        assert_eq!(config.backoff.max_attempts, 3);
    }

    #[test]
    fn rejects_zero_attempts() {
        let result = Cli::try_parse_from(["headset-remote", "run", "--max-attempts", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn evaluation_needs_video_and_position() {
        assert!(
            Cli::try_parse_from(["headset-remote", "restrictions", "--video", "rio.mp4"]).is_err()
        );
        let cli = Cli::try_parse_from([
            "headset-remote",
            "restrictions",
            "--video",
            "rio.mp4",
            "--at",
            "30",
        ])
        .unwrap();
        let Some(Command::Restrictions(args)) = cli.command else {
            panic!("expected restrictions subcommand");
        };
        assert_eq!(args.video.as_deref(), Some("rio.mp4"));
        assert_eq!(args.at, Some(30.0));
    }

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
