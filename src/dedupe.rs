//! Company deduplication: group by normalized name, merge contacts.
//!
//! A straight CRUD loop with no retry or backoff: per-company API errors are
//! reported and the loop moves on. Dry-run (the default) walks the same path
//! but issues no writes.
use anyhow::Result;
use std::collections::BTreeMap;

use crate::api::{Company, CrmApi};

/// Counters for one dedup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DedupeStats {
    pub(crate) duplicates_found: u64,
    pub(crate) contacts_moved: u64,
    pub(crate) companies_removed: u64,
}

/// Groups of companies sharing a lowercased name, keyed by that name.
pub(crate) type DuplicateGroups = BTreeMap<String, Vec<Company>>;

pub(crate) struct CompanyDeduper<'a, C: CrmApi> {
    api: &'a C,
    dry_run: bool,
}

impl<'a, C: CrmApi> CompanyDeduper<'a, C> {
    pub(crate) fn new(api: &'a C, dry_run: bool) -> Self {
        Self { api, dry_run }
    }

    /// Page through every company and keep the name groups with more than
    /// one record. Companies without a name property are ignored.
    pub(crate) fn find_duplicates(&self) -> Result<DuplicateGroups> {
        let mut by_name: DuplicateGroups = BTreeMap::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.api.fetch_companies_page(cursor.as_deref())?;
            for company in page.companies {
                match company.name.as_deref() {
                    Some(name) => by_name
                        .entry(name.to_lowercase())
                        .or_default()
                        .push(company),
                    None => {
                        tracing::debug!(company_id = %company.id, "company has no name, skipping")
                    }
                }
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        by_name.retain(|_, group| group.len() > 1);
        Ok(by_name)
    }

    pub(crate) fn print_report(&self, duplicates: &DuplicateGroups) {
        for (name, group) in duplicates {
            println!("Company: {name}");
            println!("Number of duplicates: {}", group.len() - 1);
            println!("Records:");
            for company in group {
                println!("- ID: {}", company.id);
            }
            println!();
        }
    }

    /// Merge every duplicate into the first company of its group. Errors on
    /// one company are reported and do not stop the pass.
    pub(crate) fn process(&self, duplicates: &DuplicateGroups) -> DedupeStats {
        let mut stats = DedupeStats::default();
        for group in duplicates.values() {
            stats.duplicates_found += (group.len() - 1) as u64;
            let main_id = &group[0].id;
            for duplicate in &group[1..] {
                if let Err(err) = self.merge_into(main_id, &duplicate.id, &mut stats) {
                    println!("Error processing company {}: {err:#}", duplicate.id);
                }
            }
        }
        stats
    }

    fn merge_into(
        &self,
        main_id: &str,
        duplicate_id: &str,
        stats: &mut DedupeStats,
    ) -> Result<()> {
        let contacts = self.api.company_contacts(duplicate_id)?;
        for contact_id in &contacts {
            if !self.dry_run {
                self.api.associate_contact(main_id, contact_id)?;
                self.api.archive_association(duplicate_id, contact_id)?;
            }
            stats.contacts_moved += 1;
        }
        if !self.dry_run {
            self.api.archive_company(duplicate_id)?;
        }
        stats.companies_removed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockCrmApi;

    #[test]
    fn grouping_is_case_insensitive_and_spans_pages() {
        let api = MockCrmApi::new();
        api.push_company_page(&[("1", "Acme"), ("2", "Globex")], Some("2"));
        api.push_company_page(&[("3", "ACME"), ("4", "initech")], None);

        let deduper = CompanyDeduper::new(&api, true);
        let duplicates = deduper.find_duplicates().expect("find duplicates");

        assert_eq!(duplicates.len(), 1);
        let group = duplicates.get("acme").expect("acme group");
        let ids: Vec<&str> = group.iter().map(|company| company.id.as_str()).collect();
        assert_eq!(ids, ["1", "3"]);
    }

    #[test]
    fn dry_run_counts_but_issues_no_writes() {
        let api = MockCrmApi::new();
        api.push_company_page(&[("1", "Acme"), ("2", "Acme")], None);
        api.set_company_contacts("2", &["c1", "c2"]);

        let deduper = CompanyDeduper::new(&api, true);
        let duplicates = deduper.find_duplicates().expect("find duplicates");
        let stats = deduper.process(&duplicates);

        assert_eq!(
            stats,
            DedupeStats {
                duplicates_found: 1,
                contacts_moved: 2,
                companies_removed: 1,
            }
        );
        assert!(api.write_calls().is_empty());
    }

    #[test]
    fn apply_moves_contacts_then_archives_the_duplicate() {
        let api = MockCrmApi::new();
        api.push_company_page(&[("1", "Acme"), ("2", "Acme")], None);
        api.set_company_contacts("2", &["c1"]);

        let deduper = CompanyDeduper::new(&api, false);
        let duplicates = deduper.find_duplicates().expect("find duplicates");
        let stats = deduper.process(&duplicates);

        assert_eq!(stats.contacts_moved, 1);
        assert_eq!(stats.companies_removed, 1);
        assert_eq!(
            api.write_calls(),
            [
                "associate 1 c1",
                "archive-association 2 c1",
                "archive-company 2"
            ]
        );
    }

    #[test]
    fn an_error_on_one_company_does_not_stop_the_pass() {
        let api = MockCrmApi::new();
        api.push_company_page(&[("1", "Acme"), ("2", "Acme"), ("3", "Acme")], None);
        api.fail_company_contacts("2");
        api.set_company_contacts("3", &["c9"]);

        let deduper = CompanyDeduper::new(&api, false);
        let duplicates = deduper.find_duplicates().expect("find duplicates");
        let stats = deduper.process(&duplicates);

        // Company 2 failed; company 3 was still merged into 1.
        assert_eq!(stats.duplicates_found, 2);
        assert_eq!(stats.companies_removed, 1);
        assert_eq!(
            api.write_calls(),
            [
                "associate 1 c9",
                "archive-association 3 c9",
                "archive-company 3"
            ]
        );
    }
}
