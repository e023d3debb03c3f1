//! CLI argument parsing for the HubSpot jobs.
//!
//! The CLI is intentionally thin: it wires arguments into the enrollment and
//! dedup routines without embedding policy, so the same core logic stays
//! testable without a terminal.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default location of the sender identity configuration.
pub const DEFAULT_SENDERS_PATH: &str = "config/sender_emails.json";

/// Default directory holding per-(list, sequence) enrollment ledgers.
pub const DEFAULT_LEDGER_DIR: &str = "logs";

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "hubops",
    version,
    about = "HubSpot sequence enrollment and company dedup jobs",
    after_help = "Commands:\n  enroll <list_id> <sequence_id>  Enroll a contact list into a sequence\n  dedupe                          Merge duplicate companies by name\n\nExamples:\n  hubops enroll 42 9001\n  hubops enroll --ignore-errors 42 9001\n  hubops dedupe\n  hubops dedupe --apply",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level jobs.
#[derive(Subcommand, Debug)]
pub enum Command {
    Enroll(EnrollArgs),
    Dedupe(DedupeArgs),
}

/// Enroll command inputs for a single (list, sequence) run.
#[derive(Parser, Debug)]
#[command(about = "Enroll every contact in a list into an outreach sequence")]
pub struct EnrollArgs {
    /// Contact list to page through
    pub list_id: String,

    /// Sequence to enroll contacts into
    pub sequence_id: String,

    /// Retry contacts whose previous run recorded a failure
    #[arg(long)]
    pub ignore_errors: bool,

    /// Sender identity configuration JSON
    #[arg(long, value_name = "PATH", default_value = DEFAULT_SENDERS_PATH)]
    pub senders: PathBuf,

    /// Directory holding enrollment ledgers
    #[arg(long, value_name = "DIR", default_value = DEFAULT_LEDGER_DIR)]
    pub ledger_dir: PathBuf,
}

/// Dedupe command inputs.
#[derive(Parser, Debug)]
#[command(about = "Find duplicate companies by name and merge their contacts")]
pub struct DedupeArgs {
    /// Perform the merge; without this flag the run is a dry run that only
    /// reports what would change
    #[arg(long)]
    pub apply: bool,
}
