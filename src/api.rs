//! Typed HubSpot API seam.
//!
//! This module defines the `CrmApi` trait so the enrollment engine and the
//! dedup job can run against an in-process mock in tests. Responses are
//! decoded into explicit schemas; a body that does not match fails with a
//! parse error naming the endpoint instead of silently reading missing keys
//! as null.
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::senders::Sender;

const BASE_URL: &str = "https://api.hubapi.com";
const PAGE_SIZE: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reserved `errorType` value signaling the sender's send quota is spent.
const SEND_LIMIT_ERROR: &str = "SequenceError.SEND_LIMIT_EXCEEDED";

/// A contact surfaced by the list API. Transient; owned by no component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Contact {
    pub(crate) id: String,
    pub(crate) email: Option<String>,
}

impl Contact {
    /// Email for progress output, `N/A` when the property is absent.
    pub(crate) fn email_label(&self) -> &str {
        self.email.as_deref().unwrap_or("N/A")
    }
}

/// One page of contacts plus the cursor for the next page, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ContactPage {
    pub(crate) contacts: Vec<Contact>,
    pub(crate) next_cursor: Option<u64>,
}

/// Outcome of one enrollment attempt, dispatched by the engine's retry
/// policy. Transport and unknown failures are `Err` at the call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EnrollOutcome {
    /// 2xx: the contact is enrolled.
    Enrolled,
    /// 400 with the reserved send-limit error type; sender-specific and
    /// transient, recoverable by rotating senders.
    QuotaExceeded,
    /// 429: server-side throttling, treated like quota for retry purposes.
    RateLimited { message: String },
    /// Any other 400: contact-specific and permanent, never retried.
    Rejected { message: String },
}

/// A company record surfaced by the companies API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Company {
    pub(crate) id: String,
    pub(crate) name: Option<String>,
}

/// One page of companies plus the cursor for the next page, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompanyPage {
    pub(crate) companies: Vec<Company>,
    pub(crate) next_cursor: Option<String>,
}

/// Synchronous HubSpot API surface used by the jobs.
pub(crate) trait CrmApi {
    /// Fetch one page of list members. `cursor` is the `vid-offset` returned
    /// by the previous page.
    fn fetch_contacts_page(&self, list_id: &str, cursor: Option<u64>) -> Result<ContactPage>;

    /// Attempt to enroll one contact into a sequence as the given sender.
    fn enroll(&self, contact_id: &str, sequence_id: &str, sender: &Sender)
        -> Result<EnrollOutcome>;

    /// Fetch one page of company records with their `name` property.
    fn fetch_companies_page(&self, cursor: Option<&str>) -> Result<CompanyPage>;

    /// Contact ids associated with a company.
    fn company_contacts(&self, company_id: &str) -> Result<Vec<String>>;

    /// Associate a contact with a company.
    fn associate_contact(&self, company_id: &str, contact_id: &str) -> Result<()>;

    /// Remove a contact's association with a company.
    fn archive_association(&self, company_id: &str, contact_id: &str) -> Result<()>;

    /// Archive (delete) a company record.
    fn archive_company(&self, company_id: &str) -> Result<()>;
}

// ============================================================================
// Wire schemas
// ============================================================================

#[derive(Deserialize)]
struct ContactPageWire {
    #[serde(default)]
    contacts: Vec<ContactWire>,
    #[serde(rename = "has-more", default)]
    has_more: bool,
    #[serde(rename = "vid-offset", default)]
    vid_offset: Option<u64>,
}

#[derive(Deserialize)]
struct ContactWire {
    vid: u64,
    #[serde(default)]
    properties: ContactPropertiesWire,
}

#[derive(Deserialize, Default)]
struct ContactPropertiesWire {
    email: Option<PropertyValueWire>,
}

#[derive(Deserialize)]
struct PropertyValueWire {
    value: String,
}

#[derive(Deserialize)]
struct ApiErrorWire {
    #[serde(rename = "errorType")]
    error_type: Option<String>,
    message: Option<String>,
}

impl ApiErrorWire {
    /// The original API prefers `errorType` over `message` when classifying.
    fn detail(self) -> String {
        self.error_type
            .or(self.message)
            .unwrap_or_else(|| "Unknown error".to_string())
    }
}

#[derive(Deserialize)]
struct CompanyPageWire {
    #[serde(default)]
    results: Vec<CompanyWire>,
    paging: Option<PagingWire>,
}

#[derive(Deserialize)]
struct CompanyWire {
    id: String,
    #[serde(default)]
    properties: CompanyPropertiesWire,
}

#[derive(Deserialize, Default)]
struct CompanyPropertiesWire {
    name: Option<String>,
}

#[derive(Deserialize)]
struct PagingWire {
    next: Option<PagingNextWire>,
}

#[derive(Deserialize)]
struct PagingNextWire {
    after: String,
}

#[derive(Deserialize)]
struct AssociationListWire {
    #[serde(default)]
    results: Vec<AssociationWire>,
}

#[derive(Deserialize)]
struct AssociationWire {
    id: String,
}

impl From<ContactPageWire> for ContactPage {
    fn from(wire: ContactPageWire) -> Self {
        let next_cursor = if wire.has_more { wire.vid_offset } else { None };
        ContactPage {
            contacts: wire
                .contacts
                .into_iter()
                .map(|contact| Contact {
                    id: contact.vid.to_string(),
                    email: contact.properties.email.map(|prop| prop.value),
                })
                .collect(),
            next_cursor,
        }
    }
}

impl From<CompanyPageWire> for CompanyPage {
    fn from(wire: CompanyPageWire) -> Self {
        CompanyPage {
            companies: wire
                .results
                .into_iter()
                .map(|company| Company {
                    id: company.id,
                    name: company.properties.name,
                })
                .collect(),
            next_cursor: wire
                .paging
                .and_then(|paging| paging.next)
                .map(|next| next.after),
        }
    }
}

// ============================================================================
// Production client over ureq
// ============================================================================

/// Production client talking to the HubSpot API with bearer auth.
pub(crate) struct HubSpotClient {
    agent: ureq::Agent,
    token: String,
    base_url: String,
}

impl HubSpotClient {
    pub(crate) fn new(token: String) -> Self {
        // Status errors are disabled so 400/429 bodies stay readable for
        // outcome classification.
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl CrmApi for HubSpotClient {
    fn fetch_contacts_page(&self, list_id: &str, cursor: Option<u64>) -> Result<ContactPage> {
        let url = format!("{}/contacts/v1/lists/{list_id}/contacts/all", self.base_url);
        let mut request = self
            .agent
            .get(&url)
            .header("Authorization", self.bearer())
            .query("count", PAGE_SIZE.to_string())
            .query("property", "email");
        if let Some(offset) = cursor {
            request = request.query("vidOffset", offset.to_string());
        }
        let mut response = request
            .call()
            .with_context(|| format!("fetch contacts page for list {list_id}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!(
                "list contacts returned status {status} for list {list_id}"
            ));
        }
        let wire: ContactPageWire = response
            .body_mut()
            .read_json()
            .context("parse list contacts response")?;
        Ok(wire.into())
    }

    fn enroll(
        &self,
        contact_id: &str,
        sequence_id: &str,
        sender: &Sender,
    ) -> Result<EnrollOutcome> {
        let url = format!("{}/automation/v4/sequences/enrollments", self.base_url);
        let body = serde_json::json!({
            "contactId": contact_id,
            "sequenceId": sequence_id,
            "senderEmail": sender.email,
        });
        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", self.bearer())
            .query("userId", &sender.user_id)
            .send_json(&body)
            .with_context(|| format!("enroll contact {contact_id}"))?;
        let status = response.status();
        if status.is_success() {
            return Ok(EnrollOutcome::Enrolled);
        }
        tracing::debug!(contact_id, status = status.as_u16(), "enrollment not accepted");
        match status.as_u16() {
            400 => {
                let wire: ApiErrorWire = response
                    .body_mut()
                    .read_json()
                    .context("parse enrollment error response")?;
                let detail = wire.detail();
                if detail == SEND_LIMIT_ERROR {
                    Ok(EnrollOutcome::QuotaExceeded)
                } else {
                    Ok(EnrollOutcome::Rejected { message: detail })
                }
            }
            429 => {
                let wire: ApiErrorWire = response
                    .body_mut()
                    .read_json()
                    .context("parse rate limit response")?;
                Ok(EnrollOutcome::RateLimited {
                    message: wire.detail(),
                })
            }
            other => Err(anyhow!(
                "enrollment returned status {other} for contact {contact_id}"
            )),
        }
    }

    fn fetch_companies_page(&self, cursor: Option<&str>) -> Result<CompanyPage> {
        let url = format!("{}/crm/v3/objects/companies", self.base_url);
        let mut request = self
            .agent
            .get(&url)
            .header("Authorization", self.bearer())
            .query("limit", PAGE_SIZE.to_string())
            .query("properties", "name,domain");
        if let Some(after) = cursor {
            request = request.query("after", after);
        }
        let mut response = request.call().context("fetch companies page")?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("list companies returned status {status}"));
        }
        let wire: CompanyPageWire = response
            .body_mut()
            .read_json()
            .context("parse companies response")?;
        Ok(wire.into())
    }

    fn company_contacts(&self, company_id: &str) -> Result<Vec<String>> {
        let url = format!(
            "{}/crm/v3/objects/companies/{company_id}/associations/contacts",
            self.base_url
        );
        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", self.bearer())
            .call()
            .with_context(|| format!("fetch contacts for company {company_id}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!(
                "company associations returned status {status} for company {company_id}"
            ));
        }
        let wire: AssociationListWire = response
            .body_mut()
            .read_json()
            .context("parse company associations response")?;
        Ok(wire.results.into_iter().map(|assoc| assoc.id).collect())
    }

    fn associate_contact(&self, company_id: &str, contact_id: &str) -> Result<()> {
        let url = format!(
            "{}/crm/v3/objects/companies/{company_id}/associations/contacts/{contact_id}/company_to_contact",
            self.base_url
        );
        let response = self
            .agent
            .put(&url)
            .header("Authorization", self.bearer())
            .send_empty()
            .with_context(|| format!("associate contact {contact_id} with company {company_id}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!(
                "associate contact returned status {status} for company {company_id}"
            ));
        }
        Ok(())
    }

    fn archive_association(&self, company_id: &str, contact_id: &str) -> Result<()> {
        let url = format!(
            "{}/crm/v3/objects/companies/{company_id}/associations/contacts/{contact_id}/company_to_contact",
            self.base_url
        );
        let response = self
            .agent
            .delete(&url)
            .header("Authorization", self.bearer())
            .call()
            .with_context(|| {
                format!("archive association of contact {contact_id} with company {company_id}")
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!(
                "archive association returned status {status} for company {company_id}"
            ));
        }
        Ok(())
    }

    fn archive_company(&self, company_id: &str) -> Result<()> {
        let url = format!("{}/crm/v3/objects/companies/{company_id}", self.base_url);
        let response = self
            .agent
            .delete(&url)
            .header("Authorization", self.bearer())
            .call()
            .with_context(|| format!("archive company {company_id}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!(
                "archive company returned status {status} for company {company_id}"
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Test mock
// ============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_page_wire_maps_cursor_only_when_more_pages_remain() {
        let raw = r#"{
            "contacts": [
                {"vid": 101, "properties": {"email": {"value": "a@example.com"}}},
                {"vid": 102, "properties": {}}
            ],
            "has-more": true,
            "vid-offset": 102
        }"#;
        let wire: ContactPageWire = serde_json::from_str(raw).expect("parse page");
        let page: ContactPage = wire.into();
        assert_eq!(page.next_cursor, Some(102));
        assert_eq!(page.contacts.len(), 2);
        assert_eq!(page.contacts[0].email.as_deref(), Some("a@example.com"));
        assert_eq!(page.contacts[1].email_label(), "N/A");

        let last = r#"{"contacts": [], "has-more": false, "vid-offset": 102}"#;
        let wire: ContactPageWire = serde_json::from_str(last).expect("parse last page");
        let page: ContactPage = wire.into();
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn error_body_prefers_error_type_over_message() {
        let raw = r#"{"message": "friendly text", "errorType": "SequenceError.SEND_LIMIT_EXCEEDED"}"#;
        let wire: ApiErrorWire = serde_json::from_str(raw).expect("parse error body");
        assert_eq!(wire.detail(), SEND_LIMIT_ERROR);

        let message_only = r#"{"message": "contact is missing an email"}"#;
        let wire: ApiErrorWire = serde_json::from_str(message_only).expect("parse error body");
        assert_eq!(wire.detail(), "contact is missing an email");

        let empty = r#"{}"#;
        let wire: ApiErrorWire = serde_json::from_str(empty).expect("parse error body");
        assert_eq!(wire.detail(), "Unknown error");
    }

    #[test]
    fn company_page_wire_maps_paging_cursor() {
        let raw = r#"{
            "results": [{"id": "900", "properties": {"name": "Acme"}}],
            "paging": {"next": {"after": "900"}}
        }"#;
        let wire: CompanyPageWire = serde_json::from_str(raw).expect("parse companies");
        let page: CompanyPage = wire.into();
        assert_eq!(page.companies[0].name.as_deref(), Some("Acme"));
        assert_eq!(page.next_cursor.as_deref(), Some("900"));

        let last = r#"{"results": []}"#;
        let wire: CompanyPageWire = serde_json::from_str(last).expect("parse last page");
        let page: CompanyPage = wire.into();
        assert_eq!(page.next_cursor, None);
    }
}
