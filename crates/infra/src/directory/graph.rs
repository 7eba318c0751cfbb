//! Microsoft Graph adapter (client-credentials OAuth2 + REST v1.0).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use seatwatch_core::{ReportError, ReportResult, SkuId, TenantLicense, UserFilter, UserRecord};

use super::{DirectoryConnector, DirectoryError, DirectorySession};

/// Application permissions granted to the registered app.
pub const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

const USER_SELECT: &str = "id,displayName,mail,department,jobTitle,officeLocation,city,\
accountEnabled,usageLocation,assignedLicenses";

/// Connection settings for one tenant.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    /// e.g. `https://login.microsoftonline.com`
    pub login_base: String,
    /// e.g. `https://graph.microsoft.com`
    pub graph_base: String,
    /// Retries for throttled (429) or unavailable (503) responses.
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl GraphConfig {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            login_base: "https://login.microsoftonline.com".to_string(),
            graph_base: "https://graph.microsoft.com".to_string(),
            max_retries: 5,
            base_backoff: Duration::from_millis(500),
        }
    }

    pub fn with_endpoints(mut self, login_base: impl Into<String>, graph_base: impl Into<String>) -> Self {
        self.login_base = login_base.into().trim_end_matches('/').to_string();
        self.graph_base = graph_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retries(mut self, max_retries: u32, base_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_backoff = base_backoff;
        self
    }
}

/// Connector that performs the token exchange.
#[derive(Debug, Clone)]
pub struct GraphDirectory {
    http: reqwest::Client,
    config: GraphConfig,
}

impl GraphDirectory {
    pub fn new(http: reqwest::Client, config: GraphConfig) -> Self {
        Self { http, config }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[async_trait]
impl DirectoryConnector for GraphDirectory {
    type Session = GraphSession;

    async fn authenticate(&self, scopes: &[&str]) -> ReportResult<GraphSession> {
        let url = format!("{}/{}/oauth2/v2.0/token", self.config.login_base, self.config.tenant_id);
        let scope = scopes.join(" ");
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", scope.as_str()),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| ReportError::authentication(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::authentication(format!("HTTP {}: {body}", status.as_u16())));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ReportError::authentication(format!("token response: {e}")))?;

        info!(tenant = %self.config.tenant_id, "directory session established");
        Ok(GraphSession {
            http: self.http.clone(),
            graph_base: self.config.graph_base.clone(),
            token: token.access_token,
            max_retries: self.config.max_retries,
            base_backoff: self.config.base_backoff,
        })
    }
}

/// Authenticated Graph session (bearer token).
#[derive(Clone)]
pub struct GraphSession {
    http: reqwest::Client,
    graph_base: String,
    token: String,
    max_retries: u32,
    base_backoff: Duration,
}

impl core::fmt::Debug for GraphSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GraphSession")
            .field("graph_base", &self.graph_base)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct Page<T> {
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscribedSku {
    sku_id: Option<String>,
    sku_part_number: Option<String>,
    consumed_units: Option<i64>,
    prepaid_units: Option<PrepaidUnits>,
}

#[derive(Deserialize)]
struct PrepaidUnits {
    enabled: Option<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    id: String,
    display_name: Option<String>,
    mail: Option<String>,
    department: Option<String>,
    job_title: Option<String>,
    office_location: Option<String>,
    city: Option<String>,
    account_enabled: Option<bool>,
    usage_location: Option<String>,
    #[serde(default)]
    assigned_licenses: Vec<SkuRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkuRef {
    sku_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Organization {
    display_name: Option<String>,
}

fn non_negative(units: Option<i64>) -> u64 {
    units.and_then(|u| u64::try_from(u).ok()).unwrap_or(0)
}

fn sku_ids(refs: Vec<SkuRef>) -> Vec<SkuId> {
    refs.into_iter()
        .filter_map(|r| r.sku_id)
        .map(SkuId::new)
        .filter(|id| !id.is_empty())
        .collect()
}

impl From<GraphUser> for UserRecord {
    fn from(u: GraphUser) -> Self {
        UserRecord {
            id: u.id,
            display_name: u.display_name,
            mail: u.mail,
            department: u.department,
            job_title: u.job_title,
            office_location: u.office_location,
            city: u.city,
            assigned_license_sku_ids: sku_ids(u.assigned_licenses),
            account_enabled: u.account_enabled,
            usage_location: u.usage_location,
        }
    }
}

impl GraphSession {
    fn url(&self, path: &str) -> String {
        format!("{}/v1.0/{path}", self.graph_base)
    }

    /// GET with bounded retries on throttling.
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, DirectoryError> {
        let mut attempt: u32 = 0;
        loop {
            let response = self.http.get(url).bearer_auth(&self.token).send().await?;
            let status = response.status();

            if status.is_success() {
                return response
                    .json::<T>()
                    .await
                    .map_err(|e| DirectoryError::Decode(format!("{url}: {e}")));
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE;
            if retryable && attempt < self.max_retries {
                attempt += 1;
                let delay = retry_after(&response).unwrap_or_else(|| backoff(self.base_backoff, attempt));
                warn!(%url, status = status.as_u16(), attempt, delay_ms = delay.as_millis() as u64, "directory throttled; retrying");
                tokio::time::sleep(delay).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body,
            });
        }
    }

    /// Follow `@odata.nextLink` until exhausted.
    async fn get_paged<T: DeserializeOwned>(&self, first: String) -> Result<Vec<T>, DirectoryError> {
        let mut items = Vec::new();
        let mut next = Some(first);
        let mut pages = 0usize;
        while let Some(url) = next {
            let page: Page<T> = self.get_json(&url).await?;
            pages += 1;
            items.extend(page.value);
            next = page.next_link;
        }
        debug!(pages, items = items.len(), "paged listing complete");
        Ok(items)
    }
}

#[async_trait]
impl DirectorySession for GraphSession {
    async fn list_subscribed_products(&self) -> Result<Vec<TenantLicense>, DirectoryError> {
        let skus: Vec<SubscribedSku> = self.get_paged(self.url("subscribedSkus")).await?;
        Ok(skus
            .into_iter()
            .filter_map(|s| {
                let sku_id = SkuId::new(s.sku_id?);
                if sku_id.is_empty() {
                    return None;
                }
                Some(TenantLicense {
                    sku_id,
                    consumed_units: non_negative(s.consumed_units),
                    total_units: non_negative(s.prepaid_units.and_then(|p| p.enabled)),
                    sku_part_number: s.sku_part_number,
                })
            })
            .collect())
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<UserRecord>, DirectoryError> {
        let users: Vec<GraphUser> = self
            .get_paged(self.url(&format!("users?$select={USER_SELECT}&$top=999")))
            .await?;
        let listed = users.len();
        let accepted: Vec<UserRecord> = users
            .into_iter()
            .map(UserRecord::from)
            .filter(|u| filter.matches(u))
            .collect();
        info!(listed, accepted = accepted.len(), "users listed");
        Ok(accepted)
    }

    async fn user_license_details(&self, user_id: &str) -> Result<Vec<SkuId>, DirectoryError> {
        let details: Vec<SkuRef> = self
            .get_paged(self.url(&format!("users/{user_id}/licenseDetails")))
            .await?;
        Ok(sku_ids(details))
    }

    async fn organization_display_name(&self) -> Result<String, DirectoryError> {
        let orgs: Page<Organization> = self.get_json(&self.url("organization")).await?;
        orgs.value
            .into_iter()
            .find_map(|o| o.display_name)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| DirectoryError::Decode("organization has no display name".to_string()))
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    let secs: u64 = response.headers().get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    Some(Duration::from_secs(secs.min(60)))
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    // Exponential backoff: base * 2^(attempt-1), capped.
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    let ms = base.as_millis().saturating_mul(pow as u128);
    Duration::from_millis(ms.min(30_000) as u64)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Form, Json, Router};
    use serde_json::json;

    use super::*;

    #[derive(Clone)]
    struct FakeGraph {
        base_url: String,
        org_calls: Arc<AtomicUsize>,
    }

    struct TestServer {
        base_url: String,
        org_calls: Arc<AtomicUsize>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer test-token")
    }

    async fn token(Path(tenant): Path<String>, Form(form): Form<HashMap<String, String>>) -> Response {
        if tenant != "contoso-tenant" || form.get("client_secret").map(String::as_str) != Some("s3cret") {
            return (StatusCode::UNAUTHORIZED, "invalid_client").into_response();
        }
        assert_eq!(form.get("grant_type").map(String::as_str), Some("client_credentials"));
        Json(json!({ "access_token": "test-token", "token_type": "Bearer" })).into_response()
    }

    async fn subscribed_skus(headers: HeaderMap) -> Response {
        if !authorized(&headers) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Json(json!({
            "value": [
                { "skuId": "sku-A", "skuPartNumber": "ENTERPRISEPACK", "consumedUnits": 3,
                  "prepaidUnits": { "enabled": 5, "suspended": 0, "warning": 0 } },
                { "skuId": "sku-B", "consumedUnits": -1, "prepaidUnits": null },
                { "skuId": null, "consumedUnits": 1 }
            ]
        }))
        .into_response()
    }

    async fn users(
        State(state): State<FakeGraph>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Response {
        if query.get("$skiptoken").map(String::as_str) == Some("page2") {
            return Json(json!({
                "value": [
                    { "id": "u2", "displayName": "Zoë", "department": "Sales", "accountEnabled": false,
                      "assignedLicenses": [] }
                ]
            }))
            .into_response();
        }
        assert!(query.get("$select").is_some_and(|s| s.contains("officeLocation")));
        Json(json!({
            "value": [
                { "id": "u1", "displayName": "Ada", "mail": "ada@contoso.com", "department": "Finance",
                  "jobTitle": null, "officeLocation": "Paris", "city": "Paris", "accountEnabled": true,
                  "usageLocation": "FR", "assignedLicenses": [ { "skuId": "sku-A", "disabledPlans": [] } ] }
            ],
            "@odata.nextLink": format!("{}/v1.0/users?$skiptoken=page2", state.base_url)
        }))
        .into_response()
    }

    async fn license_details(Path(user_id): Path<String>) -> Response {
        match user_id.as_str() {
            "u1" => Json(json!({ "value": [ { "skuId": "sku-A", "skuPartNumber": "ENTERPRISEPACK" } ] })).into_response(),
            _ => (StatusCode::NOT_FOUND, "no such user").into_response(),
        }
    }

    async fn organization(State(state): State<FakeGraph>) -> Response {
        // First call is throttled.
        if state.org_calls.fetch_add(1, Ordering::SeqCst) == 0 {
            return (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "0")], "slow down").into_response();
        }
        Json(json!({ "value": [ { "displayName": "Contoso Réunion" } ] })).into_response()
    }

    impl TestServer {
        async fn spawn() -> Self {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("failed to bind ephemeral port");
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let org_calls = Arc::new(AtomicUsize::new(0));
            let state = FakeGraph {
                base_url: base_url.clone(),
                org_calls: org_calls.clone(),
            };

            let app = Router::new()
                .route("/:tenant/oauth2/v2.0/token", post(token))
                .route("/v1.0/subscribedSkus", get(subscribed_skus))
                .route("/v1.0/users", get(users))
                .route("/v1.0/users/:id/licenseDetails", get(license_details))
                .route("/v1.0/organization", get(organization))
                .with_state(state);

            let handle = tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            Self {
                base_url,
                org_calls,
                handle,
            }
        }

        fn directory(&self, secret: &str) -> GraphDirectory {
            let config = GraphConfig::new("contoso-tenant", "app-id", secret)
                .with_endpoints(&self.base_url, &self.base_url)
                .with_retries(2, Duration::from_millis(1));
            GraphDirectory::new(reqwest::Client::new(), config)
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.handle.abort();
        }
    }

    #[tokio::test]
    async fn bad_credentials_fail_authentication() {
        let server = TestServer::spawn().await;

        let err = server
            .directory("wrong")
            .authenticate(&[GRAPH_DEFAULT_SCOPE])
            .await
            .unwrap_err();

        assert!(matches!(err, ReportError::AuthenticationFailure(msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn subscribed_products_map_units_defensively() {
        let server = TestServer::spawn().await;
        let session = server.directory("s3cret").authenticate(&[GRAPH_DEFAULT_SCOPE]).await.unwrap();

        let licenses = session.list_subscribed_products().await.unwrap();

        assert_eq!(licenses.len(), 2);
        assert_eq!(licenses[0].sku_id, SkuId::from("sku-A"));
        assert_eq!((licenses[0].consumed_units, licenses[0].total_units), (3, 5));
        assert_eq!(licenses[0].sku_part_number.as_deref(), Some("ENTERPRISEPACK"));
        assert_eq!((licenses[1].consumed_units, licenses[1].total_units), (0, 0));
    }

    #[tokio::test]
    async fn users_are_paged_and_filtered() {
        let server = TestServer::spawn().await;
        let session = server.directory("s3cret").authenticate(&[GRAPH_DEFAULT_SCOPE]).await.unwrap();

        let all = session.list_users(&UserFilter::accept_all()).await.unwrap();
        assert_eq!(all.iter().map(|u| u.id.as_str()).collect::<Vec<_>>(), vec!["u1", "u2"]);
        assert_eq!(all[0].assigned_license_sku_ids, vec![SkuId::from("sku-A")]);
        assert_eq!(all[0].job_title, None);
        assert_eq!(all[1].display_name.as_deref(), Some("Zoë"));

        let enabled = session
            .list_users(&UserFilter {
                enabled_only: true,
                ..UserFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, "u1");
    }

    #[tokio::test]
    async fn license_details_and_per_user_errors() {
        let server = TestServer::spawn().await;
        let session = server.directory("s3cret").authenticate(&[GRAPH_DEFAULT_SCOPE]).await.unwrap();

        assert_eq!(session.user_license_details("u1").await.unwrap(), vec![SkuId::from("sku-A")]);

        let err = session.user_license_details("ghost").await.unwrap_err();
        assert!(matches!(err, DirectoryError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn throttled_request_is_retried() {
        let server = TestServer::spawn().await;
        let session = server.directory("s3cret").authenticate(&[GRAPH_DEFAULT_SCOPE]).await.unwrap();

        let name = session.organization_display_name().await.unwrap();

        assert_eq!(name, "Contoso Réunion");
        assert_eq!(server.org_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(250);
        assert_eq!(backoff(base, 1), Duration::from_millis(250));
        assert_eq!(backoff(base, 3), Duration::from_millis(1000));
        assert_eq!(backoff(base, 30), Duration::from_millis(30_000));
    }
}
