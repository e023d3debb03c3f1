//! Lazy cursor pagination over a contact list.
use anyhow::Result;

use crate::api::{Contact, CrmApi};

/// Pages through a list's contacts one API call at a time.
///
/// The sequence ends when the API reports no further cursor or returns an
/// empty page. There is no mid-run restart: a fresh run always begins at the
/// first page and relies on the ledger to skip completed contacts.
pub(crate) struct ContactPager<'a, C: CrmApi> {
    api: &'a C,
    list_id: &'a str,
    cursor: Option<u64>,
    done: bool,
}

impl<'a, C: CrmApi> ContactPager<'a, C> {
    pub(crate) fn new(api: &'a C, list_id: &'a str) -> Self {
        Self {
            api,
            list_id,
            cursor: None,
            done: false,
        }
    }

    /// Fetch the next page, or `None` once the list is exhausted.
    ///
    /// A transport failure propagates to the caller and aborts the run.
    pub(crate) fn next_page(&mut self) -> Result<Option<Vec<Contact>>> {
        if self.done {
            return Ok(None);
        }
        let page = self.api.fetch_contacts_page(self.list_id, self.cursor)?;
        if page.contacts.is_empty() {
            self.done = true;
            return Ok(None);
        }
        self.cursor = page.next_cursor;
        if self.cursor.is_none() {
            self.done = true;
        }
        Ok(Some(page.contacts))
    }

    /// Whether another page remains to be fetched.
    pub(crate) fn has_more(&self) -> bool {
        !self.done
    }
}
