use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod admin;
mod config;
mod homebox;
mod lock;
mod logging;
mod service;

use admin::{ListArgs, PruneArgs, ResetArgs};
use config::RunArgs;
use hbr_core::ResetTarget;

pub const DEFAULT_DB_PATH: &str = "/data/reminders.db";

#[derive(Parser, Debug)]
#[command(name = "homebox-reminders")]
#[command(about = "Homebox maintenance reminder service", long_about = None)]
struct Cli {
    /// SQLite file holding reminder state
    #[arg(long, env = "REMINDERS_DB", default_value = DEFAULT_DB_PATH, global = true)]
    db: PathBuf,

    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    /// Same as `list`
    #[arg(long = "list", id = "list_flag")]
    list_flag: bool,

    /// Same as `reset <KEY|all>`
    #[arg(long = "reset", id = "reset_flag", value_name = "KEY|all")]
    reset_flag: Option<ResetTarget>,

    /// Same as `prune <DAYS>`
    #[arg(long = "prune", id = "prune_flag", value_name = "DAYS", allow_negative_numbers = true)]
    prune_flag: Option<i64>,

    /// Row limit for `--list`
    #[arg(long = "limit", id = "limit_flag", default_value_t = admin::DEFAULT_LIST_LIMIT)]
    limit_flag: usize,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    /// Resolves the flag forms (`--list`, `--reset`, `--prune`) into the
    /// matching subcommand; `--list` wins over `--reset`, which wins over
    /// `--prune`.
    fn resolve_command(&mut self) -> Result<Commands> {
        let flagged = if self.list_flag {
            Some(Commands::List(ListArgs {
                limit: self.limit_flag,
                json: false,
            }))
        } else if let Some(target) = self.reset_flag.take() {
            Some(Commands::Reset(ResetArgs { target }))
        } else {
            self.prune_flag.map(|days| Commands::Prune(PruneArgs { days }))
        };

        match (self.command.take(), flagged) {
            (Some(_), Some(_)) => {
                bail!("use either a subcommand or --list/--reset/--prune, not both")
            }
            (Some(command), None) | (None, Some(command)) => Ok(command),
            (None, None) => Ok(Commands::Run),
        }
    }
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Poll Homebox and send reminders (the default)
    Run,
    /// List persisted reminders
    List(ListArgs),
    /// Forget one reminder by key, or `all`
    Reset(ResetArgs),
    /// Remove reminders older than N days
    Prune(PruneArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    logging::init_logging(cli.debug);

    match cli.resolve_command()? {
        Commands::Run => {
            let config = cli.run.into_config()?;
            service::run_service(&cli.db, config).await
        }
        Commands::List(args) => admin::list(&cli.db, &args),
        Commands::Reset(args) => admin::reset(&cli.db, &args),
        Commands::Prune(args) => admin::prune(&cli.db, &args, Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["homebox-reminders", "--db", "/tmp/r.db"]).expect("parse");
        assert!(cli.command.is_none());
        assert_eq!(cli.db, PathBuf::from("/tmp/r.db"));
    }

    #[test]
    fn admin_subcommands_parse() {
        let cli = Cli::try_parse_from(["homebox-reminders", "reset", "all"]).expect("parse");
        match cli.command {
            Some(Commands::Reset(args)) => assert_eq!(args.target, ResetTarget::All),
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["homebox-reminders", "list", "--limit", "5", "--json"])
            .expect("parse");
        match cli.command {
            Some(Commands::List(args)) => {
                assert_eq!(args.limit, 5);
                assert!(args.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::try_parse_from(["homebox-reminders", "prune", "90", "--db", "x.db"])
            .expect("parse");
        match cli.command {
            Some(Commands::Prune(args)) => assert_eq!(args.days, 90),
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(cli.db, PathBuf::from("x.db"));
    }

    #[test]
    fn flag_forms_map_to_subcommands() {
        let mut cli =
            Cli::try_parse_from(["homebox-reminders", "--list", "--limit", "7"]).expect("parse");
        match cli.resolve_command().expect("command") {
            Commands::List(args) => {
                assert_eq!(args.limit, 7);
                assert!(!args.json);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let mut cli = Cli::try_parse_from(["homebox-reminders", "--reset", "all"]).expect("parse");
        match cli.resolve_command().expect("command") {
            Commands::Reset(args) => assert_eq!(args.target, ResetTarget::All),
            other => panic!("unexpected command: {other:?}"),
        }

        let mut cli = Cli::try_parse_from(["homebox-reminders", "--prune", "30"]).expect("parse");
        match cli.resolve_command().expect("command") {
            Commands::Prune(args) => assert_eq!(args.days, 30),
            other => panic!("unexpected command: {other:?}"),
        }

        let mut cli = Cli::try_parse_from(["homebox-reminders", "--list", "--prune", "30"])
            .expect("parse");
        assert!(matches!(cli.resolve_command(), Ok(Commands::List(_))));

        let mut cli = Cli::try_parse_from(["homebox-reminders"]).expect("parse");
        assert!(matches!(cli.resolve_command(), Ok(Commands::Run)));
    }

    #[test]
    fn flag_and_subcommand_together_are_rejected() {
        let mut cli =
            Cli::try_parse_from(["homebox-reminders", "--list", "prune", "5"]).expect("parse");
        assert!(cli.resolve_command().is_err());
    }

    #[test]
    fn malformed_reset_key_is_a_usage_error() {
        assert!(Cli::try_parse_from(["homebox-reminders", "reset", "not-a-key"]).is_err());
        assert!(Cli::try_parse_from(["homebox-reminders", "--reset", "not-a-key"]).is_err());
    }
}
