//! Zendesk (source) adapter: read access to orgs, users, tickets, and
//! comments, plus the two custom-field stamp writes.
//!
//! The engines only see [`ZendeskApi`]; the reqwest-backed [`ZendeskClient`]
//! and the deterministic test fake both implement it.

mod client;
mod types;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::TagWindow;
use crate::error::ZendeskError;

pub use client::ZendeskClient;
pub use types::{Comment, CommentCc, Organization, Ticket, User, Via, ViaSource, ViaTo};

pub type ZendeskResult<T> = std::result::Result<T, ZendeskError>;

/// Page size used by the org readiness probe; one page is enough to tell a
/// silent org from a live one.
pub const PROBE_PAGE_SIZE: u32 = 20;

/// What to fetch when searching an org's tickets.
#[derive(Debug, Clone, Copy)]
pub struct TicketSearch {
    /// Include tickets that are not yet solved/closed.
    pub include_open: bool,
    pub page_size: u32,
    /// Stop accumulating once this many tickets are collected. 0 = no cap.
    pub limit: u64,
}

#[async_trait]
pub trait ZendeskApi: Send + Sync {
    /// All organizations carrying the tag.
    async fn search_orgs_by_tag(&self, tag: &str) -> ZendeskResult<Vec<Organization>>;

    /// Tickets for one org inside the window, cursor-paginated internally.
    async fn search_tickets(
        &self,
        org_id: i64,
        window: &TagWindow,
        search: TicketSearch,
    ) -> ZendeskResult<Vec<Ticket>>;

    async fn list_org_users(&self, org_id: i64) -> ZendeskResult<Vec<User>>;

    /// Single user fetch; `NotFound` is typed so callers can downgrade it.
    async fn get_user(&self, user_id: i64) -> ZendeskResult<User>;

    async fn list_ticket_comments(&self, ticket_id: i64) -> ZendeskResult<Vec<Comment>>;

    /// Merge-write custom org fields (the `psa_company` stamp).
    async fn update_org_fields(
        &self,
        org_id: i64,
        fields: HashMap<String, serde_json::Value>,
    ) -> ZendeskResult<()>;

    /// Merge-write custom user fields (the `psa_contact` stamp).
    async fn update_user_fields(
        &self,
        user_id: i64,
        fields: HashMap<String, serde_json::Value>,
    ) -> ZendeskResult<()>;
}
