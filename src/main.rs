use anyhow::Result;
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod api;
mod cli;
mod config;
mod dedupe;
mod engine;
mod ledger;
mod pager;
mod senders;

use api::HubSpotClient;
use cli::{Command, DedupeArgs, EnrollArgs, RootArgs};
use dedupe::CompanyDeduper;
use engine::EnrollmentEngine;
use ledger::EnrollmentLedger;
use senders::SenderPool;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hubops=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = RootArgs::parse();
    match cli.command {
        Command::Enroll(args) => cmd_enroll(args),
        Command::Dedupe(args) => cmd_dedupe(args),
    }
}

fn cmd_enroll(args: EnrollArgs) -> Result<()> {
    let token = config::api_token()?;
    let senders = config::load_senders(&args.senders)?;
    let pool = SenderPool::new(senders)?;
    let ledger = EnrollmentLedger::load(&args.ledger_dir, &args.list_id, &args.sequence_id)?;

    if args.ignore_errors {
        println!("Running with --ignore-errors: will retry previously failed enrollments\n");
    }
    tracing::info!(
        list_id = %args.list_id,
        sequence_id = %args.sequence_id,
        senders = pool.len(),
        "starting enrollment run"
    );

    let client = HubSpotClient::new(token);
    let mut engine = EnrollmentEngine::new(&client, pool, ledger, args.ignore_errors);
    let outcome = engine.run(&args.list_id, &args.sequence_id);

    // The report is printed even when the run aborts on a page fetch, so
    // partial counters are never lost.
    let stats = engine.stats();
    println!("\nSequence Enrollment Statistics:");
    println!("Contacts processed: {}", stats.processed);
    println!("Contacts enrolled: {}", stats.enrolled);
    println!("Contacts skipped: {}", stats.skipped);
    println!("Sender rotations: {}", stats.sender_rotations);
    println!("Errors: {}", stats.errors);

    let summary = engine.ledger_summary();
    println!("\nAll-time Enrollment Statistics:");
    println!("Total contacts processed: {}", summary.total);
    println!("Successfully enrolled: {}", summary.succeeded);
    println!("Failed to enroll: {}", summary.failed);

    outcome
}

fn cmd_dedupe(args: DedupeArgs) -> Result<()> {
    let token = config::api_token()?;
    let client = HubSpotClient::new(token);
    let deduper = CompanyDeduper::new(&client, !args.apply);

    if !args.apply {
        println!("Dry run: no changes will be made (pass --apply to merge)\n");
    }

    let duplicates = deduper.find_duplicates()?;
    deduper.print_report(&duplicates);
    let stats = deduper.process(&duplicates);

    println!("\nProcessing Statistics:");
    println!("Duplicates found: {}", stats.duplicates_found);
    println!("Contacts moved: {}", stats.contacts_moved);
    println!("Companies removed: {}", stats.companies_removed);
    Ok(())
}
