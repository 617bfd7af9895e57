//! ConnectWise PSA (destination) adapter: company/contact lookup, ticket and
//! note writes, custom-field queries, and the board/status/member listings
//! used during setup.

mod client;
mod types;

use async_trait::async_trait;

use crate::error::ConnectWiseError;

pub use client::ConnectWiseClient;
pub use types::{
    Board, BoardStatus, CommunicationItem, CommunicationType, Company, Contact, CustomFieldValue,
    CwTicket, Member, NewContact, NewNote, NewTicket, Ref,
};

pub type CwResult<T> = std::result::Result<T, ConnectWiseError>;

#[async_trait]
pub trait ConnectWiseApi: Send + Sync {
    /// Exact-name company lookup. `None` means no match; more than one match
    /// is an integrity error (`expected 1, got N`).
    async fn find_company_by_name(&self, name: &str) -> CwResult<Option<Company>>;

    /// Contact lookup by email (case-insensitive); typed `NoUserFound` miss.
    async fn find_contact_by_email(&self, email: &str) -> CwResult<Contact>;

    async fn create_contact(&self, contact: &NewContact) -> CwResult<Contact>;

    async fn create_ticket(&self, ticket: &NewTicket) -> CwResult<CwTicket>;

    async fn append_ticket_note(&self, ticket_id: i64, note: &NewNote) -> CwResult<()>;

    async fn update_ticket_status(&self, ticket_id: i64, status_id: i64) -> CwResult<()>;

    /// All tickets whose custom field `field_id` is non-null. This feeds the
    /// run's idempotency index.
    async fn query_tickets_by_custom_field(&self, field_id: i64) -> CwResult<Vec<CwTicket>>;

    async fn list_boards(&self) -> CwResult<Vec<Board>>;

    async fn list_board_statuses(&self, board_id: i64) -> CwResult<Vec<BoardStatus>>;

    async fn list_members(&self) -> CwResult<Vec<Member>>;
}
