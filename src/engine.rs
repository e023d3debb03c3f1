//! The enrollment engine: pagination, sender rotation, and outcome policy.
//!
//! For every contact the engine is the single point of decision: it consults
//! the ledger, attempts the remote enrollment with the currently selected
//! sender, and dispatches on the typed outcome:
//!
//! - enrolled: record success, move on
//! - quota/rate limited: rotate senders and retry the same contact; a full
//!   pool's worth of throttle responses with no success means every sender
//!   is spent, so the contact is given up for this run without a ledger
//!   write
//! - rejected (validation): record the failure, never retry with another
//!   sender
//! - transport/unknown: bounded retry across the pool, then give up without
//!   a ledger write so a future run picks the contact back up
//!
//! Per-contact errors never abort the run; only page-fetch transport
//! failures propagate, and the statistics gathered so far survive them.
use anyhow::{Context, Result};

use crate::api::{Contact, CrmApi, EnrollOutcome};
use crate::ledger::{EnrollmentLedger, LedgerSummary, RecordStatus};
use crate::pager::ContactPager;
use crate::senders::SenderPool;

/// Per-run counters. Fresh for every run, reported at the end even when the
/// run aborts on a page fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunStats {
    pub(crate) processed: u64,
    pub(crate) enrolled: u64,
    pub(crate) skipped: u64,
    pub(crate) errors: u64,
    pub(crate) sender_rotations: u64,
}

pub(crate) struct EnrollmentEngine<'a, C: CrmApi> {
    api: &'a C,
    pool: SenderPool,
    ledger: EnrollmentLedger,
    ignore_failed: bool,
    stats: RunStats,
}

impl<'a, C: CrmApi> EnrollmentEngine<'a, C> {
    pub(crate) fn new(
        api: &'a C,
        pool: SenderPool,
        ledger: EnrollmentLedger,
        ignore_failed: bool,
    ) -> Self {
        Self {
            api,
            pool,
            ledger,
            ignore_failed,
            stats: RunStats::default(),
        }
    }

    pub(crate) fn stats(&self) -> RunStats {
        self.stats
    }

    pub(crate) fn ledger_summary(&self) -> LedgerSummary {
        self.ledger.summary()
    }

    #[cfg(test)]
    pub(crate) fn current_sender_email(&self) -> &str {
        &self.pool.current().email
    }

    /// Drive the list page by page. Returns an error only for fatal
    /// conditions (page fetch transport failure, ledger write failure);
    /// `stats()` remains valid either way.
    pub(crate) fn run(&mut self, list_id: &str, sequence_id: &str) -> Result<()> {
        let api = self.api;
        let mut pager = ContactPager::new(api, list_id);
        while let Some(contacts) = pager
            .next_page()
            .with_context(|| format!("fetch contacts from list {list_id}"))?
        {
            for contact in &contacts {
                self.stats.processed += 1;
                if !self.ledger.should_process(&contact.id, self.ignore_failed) {
                    self.skip(contact);
                    continue;
                }
                self.process_contact(contact, sequence_id)?;
            }
            if pager.has_more() {
                println!(
                    "\nProcessed {} contacts so far. Moving to next batch...\n",
                    self.stats.processed
                );
            }
        }
        Ok(())
    }

    fn skip(&mut self, contact: &Contact) {
        self.stats.skipped += 1;
        match self.ledger.record(&contact.id) {
            Some(record) if record.status == RecordStatus::Succeeded => {
                println!(
                    "Contact {} ({}) was previously enrolled successfully, skipping...",
                    contact.id,
                    contact.email_label()
                );
            }
            Some(record) => {
                println!(
                    "Contact {} ({}) previously failed with error: {}, skipping...",
                    contact.id,
                    contact.email_label(),
                    record.error.as_deref().unwrap_or("unknown")
                );
            }
            // should_process only returns false when a record exists.
            None => {}
        }
    }

    /// Per-contact state machine: Attempting -> Enrolled | Failed | Exhausted.
    fn process_contact(&mut self, contact: &Contact, sequence_id: &str) -> Result<()> {
        let max_attempts = self.pool.len();
        let mut attempts = 0;
        let mut throttled = 0;
        loop {
            let sender = self.pool.current().clone();
            match self.api.enroll(&contact.id, sequence_id, &sender) {
                Ok(EnrollOutcome::Enrolled) => {
                    self.ledger.mark_outcome(&contact.id, true, None)?;
                    self.stats.enrolled += 1;
                    println!(
                        "Successfully enrolled contact {} ({})",
                        contact.id,
                        contact.email_label()
                    );
                    return Ok(());
                }
                Ok(EnrollOutcome::QuotaExceeded) => {
                    throttled += 1;
                    if throttled >= max_attempts {
                        self.give_up_throttled(contact);
                        return Ok(());
                    }
                    println!(
                        "Send limit reached for sender {}, trying next sender...",
                        sender.email
                    );
                    self.rotate();
                }
                Ok(EnrollOutcome::RateLimited { message }) => {
                    throttled += 1;
                    if throttled >= max_attempts {
                        self.give_up_throttled(contact);
                        return Ok(());
                    }
                    println!("Too many requests, message: {message}");
                    self.rotate();
                }
                Ok(EnrollOutcome::Rejected { message }) => {
                    self.ledger
                        .mark_outcome(&contact.id, false, Some(message.clone()))?;
                    self.stats.errors += 1;
                    println!(
                        "Contact {} ({}) error: {message}",
                        contact.id,
                        contact.email_label()
                    );
                    return Ok(());
                }
                Err(err) => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        self.stats.errors += 1;
                        println!("Error enrolling contact {}: {err:#}", contact.id);
                        return Ok(());
                    }
                    tracing::debug!(
                        contact_id = %contact.id,
                        attempts,
                        error = %err,
                        "enrollment attempt failed, rotating sender"
                    );
                    self.rotate();
                }
            }
        }
    }

    /// Every sender answered with quota/rate limiting for this contact.
    /// The ledger is left untouched so a plain re-run retries the contact
    /// once quotas reset.
    fn give_up_throttled(&mut self, contact: &Contact) {
        self.stats.errors += 1;
        println!(
            "Contact {} ({}): all senders over quota or rate limited, giving up for this run",
            contact.id,
            contact.email_label()
        );
    }

    fn rotate(&mut self) {
        let next = self.pool.rotate();
        self.stats.sender_rotations += 1;
        tracing::debug!(sender = %next.email, "rotated to sender");
    }
}
