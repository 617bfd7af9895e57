#![cfg(test)]

//! Deterministic fakes of both API adapters, shared by the engine tests.
//! Writes are recorded so tests can assert idempotence (a re-run must record
//! zero creations and zero stamp updates).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::TagWindow;
use crate::connectwise::{
    Board, BoardStatus, Company, CommunicationItem, ConnectWiseApi, Contact, CwResult, CwTicket,
    Member, NewContact, NewNote, NewTicket, Ref,
};
use crate::error::{ConnectWiseError, ZendeskError};
use crate::zendesk::{Comment, Organization, Ticket, TicketSearch, User, ZendeskApi, ZendeskResult};

#[derive(Default)]
pub struct MockZendesk {
    pub orgs_by_tag: Mutex<HashMap<String, Vec<Organization>>>,
    pub tickets_by_org: Mutex<HashMap<i64, Vec<Ticket>>>,
    pub users_by_org: Mutex<HashMap<i64, Vec<User>>>,
    pub users_by_id: Mutex<HashMap<i64, User>>,
    pub comments_by_ticket: Mutex<HashMap<i64, Vec<Comment>>>,
    /// Recorded `update_org_fields` calls.
    pub org_field_writes: Mutex<Vec<(i64, HashMap<String, serde_json::Value>)>>,
    /// Recorded `update_user_fields` calls.
    pub user_field_writes: Mutex<Vec<(i64, HashMap<String, serde_json::Value>)>>,
}

impl MockZendesk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_org(&self, tag: &str, org: Organization) {
        self.orgs_by_tag
            .lock()
            .entry(tag.to_string())
            .or_default()
            .push(org);
    }

    pub fn add_ticket(&self, org_id: i64, ticket: Ticket) {
        self.tickets_by_org.lock().entry(org_id).or_default().push(ticket);
    }

    pub fn add_user(&self, org_id: i64, user: User) {
        self.users_by_id.lock().insert(user.id, user.clone());
        self.users_by_org.lock().entry(org_id).or_default().push(user);
    }

    pub fn add_comment(&self, ticket_id: i64, comment: Comment) {
        self.comments_by_ticket
            .lock()
            .entry(ticket_id)
            .or_default()
            .push(comment);
    }
}

#[async_trait]
impl ZendeskApi for MockZendesk {
    async fn search_orgs_by_tag(&self, tag: &str) -> ZendeskResult<Vec<Organization>> {
        Ok(self.orgs_by_tag.lock().get(tag).cloned().unwrap_or_default())
    }

    async fn search_tickets(
        &self,
        org_id: i64,
        window: &TagWindow,
        search: TicketSearch,
    ) -> ZendeskResult<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .tickets_by_org
            .lock()
            .get(&org_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|t| search.include_open || t.is_closed())
            .filter(|t| {
                let created = t.created_at.date_naive();
                window.start.map(|s| created >= s).unwrap_or(true)
                    && window.end.map(|e| created <= e).unwrap_or(true)
            })
            .collect();
        if search.limit > 0 && tickets.len() as u64 > search.limit {
            tickets.truncate(search.limit as usize);
        }
        Ok(tickets)
    }

    async fn list_org_users(&self, org_id: i64) -> ZendeskResult<Vec<User>> {
        Ok(self.users_by_org.lock().get(&org_id).cloned().unwrap_or_default())
    }

    async fn get_user(&self, user_id: i64) -> ZendeskResult<User> {
        self.users_by_id
            .lock()
            .get(&user_id)
            .cloned()
            .ok_or(ZendeskError::NotFound {
                resource: "user",
                id: user_id,
            })
    }

    async fn list_ticket_comments(&self, ticket_id: i64) -> ZendeskResult<Vec<Comment>> {
        Ok(self
            .comments_by_ticket
            .lock()
            .get(&ticket_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_org_fields(
        &self,
        org_id: i64,
        fields: HashMap<String, serde_json::Value>,
    ) -> ZendeskResult<()> {
        self.org_field_writes.lock().push((org_id, fields));
        Ok(())
    }

    async fn update_user_fields(
        &self,
        user_id: i64,
        fields: HashMap<String, serde_json::Value>,
    ) -> ZendeskResult<()> {
        self.user_field_writes.lock().push((user_id, fields));
        Ok(())
    }
}

#[derive(Default)]
pub struct MockConnectWise {
    pub companies: Mutex<Vec<Company>>,
    pub contacts: Mutex<Vec<Contact>>,
    pub indexed_tickets: Mutex<Vec<CwTicket>>,
    pub boards: Mutex<Vec<Board>>,
    pub statuses: Mutex<HashMap<i64, Vec<BoardStatus>>>,
    pub members: Mutex<Vec<Member>>,
    /// When set, `query_tickets_by_custom_field` fails (fatal-prefetch path).
    pub fail_ticket_query: std::sync::atomic::AtomicBool,
    next_id: AtomicI64,
    /// Recorded writes, in call order.
    pub created_contacts: Mutex<Vec<NewContact>>,
    pub created_tickets: Mutex<Vec<(i64, NewTicket)>>,
    pub notes: Mutex<Vec<(i64, NewNote)>>,
    pub status_updates: Mutex<Vec<(i64, i64)>>,
}

impl MockConnectWise {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(9001),
            ..Default::default()
        }
    }

    pub fn add_company(&self, id: i64, name: &str) {
        self.companies.lock().push(Company {
            id,
            name: name.to_string(),
            identifier: String::new(),
        });
    }

    pub fn add_contact(&self, id: i64, first: &str, last: &str, company_id: i64, email: &str) {
        self.contacts.lock().push(Contact {
            id,
            first_name: first.to_string(),
            last_name: last.to_string(),
            company: Some(Ref::new(company_id)),
            communication_items: vec![CommunicationItem::email(email)],
        });
    }

    /// Seed the destination with a previously migrated ticket.
    pub fn add_indexed_ticket(&self, dest_id: i64, company_id: i64, field_id: i64, source_id: i64) {
        self.indexed_tickets.lock().push(CwTicket {
            id: dest_id,
            summary: String::new(),
            company: Some(Ref::new(company_id)),
            custom_fields: vec![crate::connectwise::CustomFieldValue {
                id: field_id,
                value: Some(serde_json::Value::from(source_id)),
            }],
        });
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Destination ticket ids created this run, in creation order.
    pub fn created_ticket_ids(&self) -> Vec<i64> {
        self.created_tickets.lock().iter().map(|(id, _)| *id).collect()
    }
}

#[async_trait]
impl ConnectWiseApi for MockConnectWise {
    async fn find_company_by_name(&self, name: &str) -> CwResult<Option<Company>> {
        let matches: Vec<Company> = self
            .companies
            .lock()
            .iter()
            .filter(|c| c.name == name)
            .cloned()
            .collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches.into_iter().next().unwrap())),
            count => Err(ConnectWiseError::UnexpectedCompanyCount {
                name: name.to_string(),
                count,
            }),
        }
    }

    async fn find_contact_by_email(&self, email: &str) -> CwResult<Contact> {
        self.contacts
            .lock()
            .iter()
            .find(|c| {
                c.email()
                    .map(|e| e.eq_ignore_ascii_case(email))
                    .unwrap_or(false)
            })
            .cloned()
            .ok_or_else(|| ConnectWiseError::NoUserFound {
                email: email.to_string(),
            })
    }

    async fn create_contact(&self, contact: &NewContact) -> CwResult<Contact> {
        let created = Contact {
            id: self.next_id(),
            first_name: contact.first_name.clone(),
            last_name: contact.last_name.clone(),
            company: Some(contact.company),
            communication_items: contact.communication_items.clone(),
        };
        self.contacts.lock().push(created.clone());
        self.created_contacts.lock().push(contact.clone());
        Ok(created)
    }

    async fn create_ticket(&self, ticket: &NewTicket) -> CwResult<CwTicket> {
        let id = self.next_id();
        self.created_tickets.lock().push((id, ticket.clone()));
        Ok(CwTicket {
            id,
            summary: ticket.summary.clone(),
            company: Some(ticket.company),
            custom_fields: ticket.custom_fields.clone(),
        })
    }

    async fn append_ticket_note(&self, ticket_id: i64, note: &NewNote) -> CwResult<()> {
        self.notes.lock().push((ticket_id, note.clone()));
        Ok(())
    }

    async fn update_ticket_status(&self, ticket_id: i64, status_id: i64) -> CwResult<()> {
        self.status_updates.lock().push((ticket_id, status_id));
        Ok(())
    }

    async fn query_tickets_by_custom_field(&self, _field_id: i64) -> CwResult<Vec<CwTicket>> {
        if self.fail_ticket_query.load(Ordering::Relaxed) {
            return Err(ConnectWiseError::Api {
                endpoint: "/service/tickets".to_string(),
                status: 500,
                body: "injected failure".to_string(),
            });
        }
        Ok(self.indexed_tickets.lock().clone())
    }

    async fn list_boards(&self) -> CwResult<Vec<Board>> {
        Ok(self.boards.lock().clone())
    }

    async fn list_board_statuses(&self, board_id: i64) -> CwResult<Vec<BoardStatus>> {
        Ok(self.statuses.lock().get(&board_id).cloned().unwrap_or_default())
    }

    async fn list_members(&self) -> CwResult<Vec<Member>> {
        Ok(self.members.lock().clone())
    }
}
