//! reqwest-backed Zendesk client.
//!
//! All calls race against the run-wide cancellation token. Pagination is
//! hidden here: list operations follow `next_page` cursor links and hand the
//! caller a fully materialized (or limit-bounded) vector.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{TagWindow, ZendeskCreds};
use crate::error::ZendeskError;

use super::{
    Comment, Organization, Ticket, TicketSearch, User, ZendeskApi, ZendeskResult,
};

const FIELD_DESCRIPTION: &str = "Created by Zendesk to ConnectWise PSA Migration utility";

/// Ids of the three source-side custom fields the tool stamps or reserves.
#[derive(Debug, Clone, Copy, Default)]
pub struct StampFieldIds {
    pub psa_company_id: i64,
    pub psa_contact_id: i64,
    pub psa_ticket_id: i64,
}

#[derive(Clone)]
pub struct ZendeskClient {
    http: reqwest::Client,
    base: String,
    username: String,
    token: String,
    cancel: CancellationToken,
}

impl ZendeskClient {
    pub fn new(creds: &ZendeskCreds, cancel: CancellationToken) -> Self {
        Self {
            http: crate::migrator_http_client(),
            base: format!("https://{}.zendesk.com", creds.subdomain),
            username: creds.username.clone(),
            token: creds.token.clone(),
            cancel,
        }
    }

    /// Cheap authenticated call used by the startup connection test.
    pub async fn test_connection(&self) -> ZendeskResult<()> {
        let url = format!("{}/api/v2/users/me.json", self.base);
        let _: serde_json::Value = self.get(&url).await?;
        Ok(())
    }

    /// Ensure the three migration custom fields exist, creating any that are
    /// missing, and return their ids.
    pub async fn ensure_stamp_fields(&self) -> ZendeskResult<StampFieldIds> {
        let mut ids = StampFieldIds::default();

        ids.psa_contact_id = match self.find_field_by_key("user_fields", "psa_contact").await? {
            Some(id) => id,
            None => {
                self.create_field(
                    "user_fields",
                    "user_field",
                    serde_json::json!({
                        "type": "integer",
                        "key": "psa_contact",
                        "title": "PSA Contact",
                        "description": FIELD_DESCRIPTION,
                    }),
                )
                .await?
            }
        };

        ids.psa_company_id = match self
            .find_field_by_key("organization_fields", "psa_company")
            .await?
        {
            Some(id) => id,
            None => {
                self.create_field(
                    "organization_fields",
                    "organization_field",
                    serde_json::json!({
                        "type": "integer",
                        "key": "psa_company",
                        "title": "PSA Company",
                        "description": FIELD_DESCRIPTION,
                    }),
                )
                .await?
            }
        };

        // Ticket fields have no key; match on title.
        ids.psa_ticket_id = match self.find_field_by_title("ticket_fields", "PSA Ticket").await? {
            Some(id) => id,
            None => {
                self.create_field(
                    "ticket_fields",
                    "ticket_field",
                    serde_json::json!({
                        "type": "integer",
                        "title": "PSA Ticket",
                        "description": FIELD_DESCRIPTION,
                    }),
                )
                .await?
            }
        };

        Ok(ids)
    }

    async fn find_field_by_key(&self, kind: &str, key: &str) -> ZendeskResult<Option<i64>> {
        Ok(self
            .list_fields(kind)
            .await?
            .into_iter()
            .find(|f| f.key.as_deref() == Some(key))
            .map(|f| f.id))
    }

    async fn find_field_by_title(&self, kind: &str, title: &str) -> ZendeskResult<Option<i64>> {
        Ok(self
            .list_fields(kind)
            .await?
            .into_iter()
            .find(|f| f.title == title)
            .map(|f| f.id))
    }

    async fn list_fields(&self, kind: &str) -> ZendeskResult<Vec<FieldDef>> {
        let mut fields = Vec::new();
        let mut url = Some(format!("{}/api/v2/{kind}.json", self.base));
        while let Some(next) = url.take() {
            let mut page: FieldsPage = self.get(&next).await?;
            url = page.next_page.take();
            fields.extend(page.fields());
        }
        Ok(fields)
    }

    async fn create_field(
        &self,
        kind: &str,
        envelope: &str,
        body: serde_json::Value,
    ) -> ZendeskResult<i64> {
        let url = format!("{}/api/v2/{kind}.json", self.base);
        let created: serde_json::Value = self
            .send(
                self.http.post(&url).json(&serde_json::json!({ envelope: body })),
                &url,
            )
            .await?;
        created[envelope]["id"].as_i64().ok_or(ZendeskError::Api {
            endpoint: url,
            status: 200,
            body: "field create response missing id".to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> ZendeskResult<T> {
        self.send(self.http.get(url), url).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> ZendeskResult<T> {
        let request = request.basic_auth(format!("{}/token", self.username), Some(&self.token));
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ZendeskError::Cancelled),
            res = request.send() => res.map_err(|cause| ZendeskError::Transport {
                endpoint: endpoint.to_string(),
                cause,
            })?,
        };
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ZendeskError::Api {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        response.json().await.map_err(|cause| ZendeskError::Decode {
            endpoint: endpoint.to_string(),
            cause,
        })
    }

    /// Run a search query, following `next_page` until done or `limit` hit.
    async fn search<T: DeserializeOwned>(
        &self,
        query: &str,
        limit: u64,
        page_size: Option<u32>,
    ) -> ZendeskResult<Vec<T>> {
        let mut results: Vec<T> = Vec::new();
        let endpoint = format!("{}/api/v2/search.json", self.base);
        let mut params = vec![("query".to_string(), query.to_string())];
        if let Some(size) = page_size {
            params.push(("per_page".to_string(), size.to_string()));
        }
        let mut page: SearchPage<T> = self
            .send(self.http.get(&endpoint).query(&params), &endpoint)
            .await?;
        loop {
            let SearchPage { results: batch, next_page } = page;
            results.extend(batch);
            if limit > 0 && results.len() as u64 >= limit {
                results.truncate(limit as usize);
                break;
            }
            match next_page {
                Some(next) => page = self.get(&next).await?,
                None => break,
            }
        }
        Ok(results)
    }
}

#[async_trait]
impl ZendeskApi for ZendeskClient {
    async fn search_orgs_by_tag(&self, tag: &str) -> ZendeskResult<Vec<Organization>> {
        let query = format!("type:organization tags:\"{tag}\"");
        debug!(tag, "searching organizations");
        self.search(&query, 0, None).await
    }

    async fn search_tickets(
        &self,
        org_id: i64,
        window: &TagWindow,
        search: TicketSearch,
    ) -> ZendeskResult<Vec<Ticket>> {
        let mut query = format!("type:ticket organization:{org_id}");
        if let Some(start) = window.start {
            query.push_str(&format!(" created>={}", start.format("%Y-%m-%d")));
        }
        if let Some(end) = window.end {
            query.push_str(&format!(" created<={}", end.format("%Y-%m-%d")));
        }
        if !search.include_open {
            // new < open < pending < hold < solved < closed
            query.push_str(" status>=solved");
        }
        debug!(org_id, query, "searching tickets");
        self.search(&query, search.limit, Some(search.page_size)).await
    }

    async fn list_org_users(&self, org_id: i64) -> ZendeskResult<Vec<User>> {
        let mut users = Vec::new();
        let mut url = Some(format!(
            "{}/api/v2/organizations/{org_id}/users.json",
            self.base
        ));
        while let Some(next) = url.take() {
            let page: UsersPage = self.get(&next).await?;
            users.extend(page.users);
            url = page.next_page;
        }
        Ok(users)
    }

    async fn get_user(&self, user_id: i64) -> ZendeskResult<User> {
        let url = format!("{}/api/v2/users/{user_id}.json", self.base);
        match self.get::<UserEnvelope>(&url).await {
            Ok(envelope) => Ok(envelope.user),
            Err(ZendeskError::Api { status: 404, .. }) => Err(ZendeskError::NotFound {
                resource: "user",
                id: user_id,
            }),
            Err(other) => Err(other),
        }
    }

    async fn list_ticket_comments(&self, ticket_id: i64) -> ZendeskResult<Vec<Comment>> {
        let mut comments = Vec::new();
        let mut url = Some(format!(
            "{}/api/v2/tickets/{ticket_id}/comments.json",
            self.base
        ));
        while let Some(next) = url.take() {
            let page: CommentsPage = self.get(&next).await?;
            comments.extend(page.comments);
            url = page.next_page;
        }
        Ok(comments)
    }

    async fn update_org_fields(
        &self,
        org_id: i64,
        fields: HashMap<String, serde_json::Value>,
    ) -> ZendeskResult<()> {
        let url = format!("{}/api/v2/organizations/{org_id}.json", self.base);
        let body = serde_json::json!({ "organization": { "organization_fields": fields } });
        let _: serde_json::Value = self.send(self.http.put(&url).json(&body), &url).await?;
        Ok(())
    }

    async fn update_user_fields(
        &self,
        user_id: i64,
        fields: HashMap<String, serde_json::Value>,
    ) -> ZendeskResult<()> {
        let url = format!("{}/api/v2/users/{user_id}.json", self.base);
        let body = serde_json::json!({ "user": { "user_fields": fields } });
        let _: serde_json::Value = self.send(self.http.put(&url).json(&body), &url).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct SearchPage<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Deserialize)]
struct UsersPage {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Deserialize)]
struct CommentsPage {
    #[serde(default)]
    comments: Vec<Comment>,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Deserialize)]
struct FieldDef {
    id: i64,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    title: String,
}

/// The three field-list endpoints use different envelope keys.
#[derive(Deserialize)]
struct FieldsPage {
    #[serde(default)]
    user_fields: Vec<FieldDef>,
    #[serde(default)]
    organization_fields: Vec<FieldDef>,
    #[serde(default)]
    ticket_fields: Vec<FieldDef>,
    #[serde(default)]
    next_page: Option<String>,
}

impl FieldsPage {
    fn fields(self) -> Vec<FieldDef> {
        let mut all = self.user_fields;
        all.extend(self.organization_fields);
        all.extend(self.ticket_fields);
        all
    }
}
