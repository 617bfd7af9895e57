//! reqwest-backed ConnectWise PSA client.
//!
//! Auth is HTTP basic with `{companyId}+{publicKey} : {privateKey}` plus the
//! `clientId` header. Only 200 and 201 count as success; anything else is an
//! error carrying the HTTP status. List endpoints return a pagination
//! envelope (`hasMorePages`, `nextLink`) which the client loops over.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ConnectWiseCreds;
use crate::error::ConnectWiseError;

use super::{
    Board, BoardStatus, Company, Contact, CwResult, CwTicket, ConnectWiseApi, Member, NewContact,
    NewNote, NewTicket,
};

const DEFAULT_BASE: &str = "https://api-na.myconnectwise.net/v4_6_release/apis/3.0";
const PAGE_SIZE: u32 = 250;

#[derive(Clone)]
pub struct ConnectWiseClient {
    http: reqwest::Client,
    base: String,
    auth_user: String,
    private_key: String,
    client_id: String,
    cancel: CancellationToken,
}

impl ConnectWiseClient {
    pub fn new(creds: &ConnectWiseCreds, cancel: CancellationToken) -> Self {
        Self::with_base(creds, cancel, DEFAULT_BASE)
    }

    pub fn with_base(creds: &ConnectWiseCreds, cancel: CancellationToken, base: &str) -> Self {
        Self {
            http: crate::migrator_http_client(),
            base: base.trim_end_matches('/').to_string(),
            auth_user: format!("{}+{}", creds.company_id, creds.public_key),
            private_key: creds.private_key.clone(),
            client_id: creds.client_id.clone(),
            cancel,
        }
    }

    /// Cheap authenticated call used by the startup connection test.
    pub async fn test_connection(&self) -> CwResult<()> {
        let _ = self.list_boards().await?;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> CwResult<T> {
        let request = request
            .basic_auth(&self.auth_user, Some(&self.private_key))
            .header("clientId", &self.client_id);
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ConnectWiseError::Cancelled),
            res = request.send() => res.map_err(|cause| ConnectWiseError::Transport {
                endpoint: endpoint.to_string(),
                cause,
            })?,
        };
        let status = response.status().as_u16();
        if status != 200 && status != 201 {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectWiseError::Api {
                endpoint: endpoint.to_string(),
                status,
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|cause| ConnectWiseError::Decode {
                endpoint: endpoint.to_string(),
                cause,
            })
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> CwResult<T> {
        self.send(self.http.get(url), url).await
    }

    /// Fetch every page of a list endpoint, following the envelope's
    /// `nextLink` while `hasMorePages` is set.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> CwResult<Vec<T>> {
        let endpoint = self.url(path);
        let mut page: PageEnvelope<T> = self
            .send(self.http.get(&endpoint).query(params), &endpoint)
            .await?;
        let mut items = Vec::new();
        loop {
            let PageEnvelope {
                items: batch,
                has_more_pages,
                next_link,
            } = page;
            items.extend(batch);
            if !has_more_pages {
                break;
            }
            match next_link {
                Some(next) => page = self.get(&next).await?,
                None => break,
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl ConnectWiseApi for ConnectWiseClient {
    async fn find_company_by_name(&self, name: &str) -> CwResult<Option<Company>> {
        let conditions = format!("name=\"{}\"", name.replace('"', "\\\""));
        debug!(name, "looking up company");
        let mut companies: Vec<Company> = self
            .get_all(
                "/company/companies",
                &[("conditions", conditions), ("pageSize", "10".to_string())],
            )
            .await?;
        match companies.len() {
            0 => Ok(None),
            1 => Ok(Some(companies.remove(0))),
            count => Err(ConnectWiseError::UnexpectedCompanyCount {
                name: name.to_string(),
                count,
            }),
        }
    }

    async fn find_contact_by_email(&self, email: &str) -> CwResult<Contact> {
        let conditions = format!("communicationItems/value=\"{email}\"");
        let contacts: Vec<Contact> = self
            .get_all(
                "/company/contacts",
                &[("childConditions", conditions), ("pageSize", "10".to_string())],
            )
            .await?;
        contacts
            .into_iter()
            .find(|c| {
                c.email()
                    .map(|e| e.eq_ignore_ascii_case(email))
                    .unwrap_or(false)
            })
            .ok_or_else(|| ConnectWiseError::NoUserFound {
                email: email.to_string(),
            })
    }

    async fn create_contact(&self, contact: &NewContact) -> CwResult<Contact> {
        let url = self.url("/company/contacts");
        self.send(self.http.post(&url).json(contact), &url).await
    }

    async fn create_ticket(&self, ticket: &NewTicket) -> CwResult<CwTicket> {
        let url = self.url("/service/tickets");
        self.send(self.http.post(&url).json(ticket), &url).await
    }

    async fn append_ticket_note(&self, ticket_id: i64, note: &NewNote) -> CwResult<()> {
        let url = self.url(&format!("/service/tickets/{ticket_id}/notes"));
        let _: serde_json::Value = self.send(self.http.post(&url).json(note), &url).await?;
        Ok(())
    }

    async fn update_ticket_status(&self, ticket_id: i64, status_id: i64) -> CwResult<()> {
        let url = self.url(&format!("/service/tickets/{ticket_id}"));
        let patch = serde_json::json!([
            { "op": "replace", "path": "status/id", "value": status_id }
        ]);
        let _: serde_json::Value = self.send(self.http.patch(&url).json(&patch), &url).await?;
        Ok(())
    }

    async fn query_tickets_by_custom_field(&self, field_id: i64) -> CwResult<Vec<CwTicket>> {
        let conditions = format!("id={field_id} AND value != null");
        self.get_all(
            "/service/tickets",
            &[
                ("customFieldConditions", conditions),
                ("pageSize", PAGE_SIZE.to_string()),
            ],
        )
        .await
    }

    async fn list_boards(&self) -> CwResult<Vec<Board>> {
        self.get_all("/service/boards", &[("pageSize", PAGE_SIZE.to_string())])
            .await
    }

    async fn list_board_statuses(&self, board_id: i64) -> CwResult<Vec<BoardStatus>> {
        self.get_all(
            &format!("/service/boards/{board_id}/statuses"),
            &[("pageSize", PAGE_SIZE.to_string())],
        )
        .await
    }

    async fn list_members(&self) -> CwResult<Vec<Member>> {
        self.get_all("/system/members", &[("pageSize", PAGE_SIZE.to_string())])
            .await
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageEnvelope<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    has_more_pages: bool,
    #[serde(default)]
    next_link: Option<String>,
}
