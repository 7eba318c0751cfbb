use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use seatwatch_cli::{run, RunSettings};
use seatwatch_core::{ReportError, SkuId};
use seatwatch_infra::{
    CatalogConfig, CatalogResolver, ExportOutcome, GraphConfig, GraphDirectory, HttpCatalogSource, XlsxExporter,
};

const CATALOG_CSV: &str = "Product_Display_Name,String_Id,GUID,Service_Plan_Name\n\
    Office 365 E3,ENTERPRISEPACK,sku-A,EXCHANGE_S_ENTERPRISE\n\
    Office 365 E3,ENTERPRISEPACK,sku-A,SHAREPOINTENTERPRISE\n\
    Microsoft Power Automate Free,FLOW_FREE,sku-X,FLOW_P2_VIRAL\n\
    ,,,\n";

#[derive(Clone)]
struct Fake {
    base_url: String,
    catalog_available: bool,
}

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(catalog_available: bool) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let state = Fake {
            base_url: base_url.clone(),
            catalog_available,
        };

        let app = Router::new()
            .route("/reference", get(reference_page))
            .route("/download/catalog.csv", get(|| async { CATALOG_CSV }))
            .route("/:tenant/oauth2/v2.0/token", post(token))
            .route("/v1.0/subscribedSkus", get(subscribed_skus))
            .route("/v1.0/users", get(users))
            .route("/v1.0/users/:id/licenseDetails", get(license_details))
            .route("/v1.0/organization", get(organization))
            .with_state(state);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn directory(&self) -> GraphDirectory {
        let config = GraphConfig::new("contoso-tenant", "app-id", "s3cret")
            .with_endpoints(&self.base_url, &self.base_url)
            .with_retries(1, Duration::from_millis(1));
        GraphDirectory::new(reqwest::Client::new(), config)
    }

    fn catalog(&self) -> CatalogResolver<HttpCatalogSource> {
        let config = CatalogConfig::new(
            format!("{}/reference", self.base_url),
            r#"http://127\.0\.0\.1:\d+/download/[^"'\s<>]+?\.csv"#,
        )
        .unwrap();
        CatalogResolver::new(HttpCatalogSource::new(reqwest::Client::new()), config)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn reference_page(State(state): State<Fake>) -> Response {
    if !state.catalog_available {
        return (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response();
    }
    format!(r#"<html><body><a href="{}/download/catalog.csv">Download</a></body></html>"#, state.base_url)
        .into_response()
}

async fn token(Form(form): Form<HashMap<String, String>>) -> Response {
    if form.get("client_secret").map(String::as_str) != Some("s3cret") {
        return (StatusCode::UNAUTHORIZED, "invalid_client").into_response();
    }
    Json(json!({ "access_token": "test-token", "token_type": "Bearer" })).into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer test-token")
}

async fn subscribed_skus(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "value": [
            { "skuId": "sku-A", "consumedUnits": 3, "prepaidUnits": { "enabled": 5 } },
            { "skuId": "sku-X", "consumedUnits": 1, "prepaidUnits": { "enabled": 10000 } },
            { "skuId": "sku-Q", "consumedUnits": 0, "prepaidUnits": { "enabled": 2 } }
        ]
    }))
    .into_response()
}

async fn users(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({
        "value": [
            { "id": "u1", "displayName": "Ada", "mail": "ada@contoso.com", "department": "Finance",
              "officeLocation": "Saint-Denis", "city": "Réunion", "accountEnabled": true,
              "assignedLicenses": [ { "skuId": "sku-A" }, { "skuId": "sku-X" }, { "skuId": "sku-Z" } ] },
            { "id": "u2", "displayName": "Zoë", "accountEnabled": true, "assignedLicenses": [] }
        ]
    }))
    .into_response()
}

async fn license_details(UrlPath(user_id): UrlPath<String>) -> Response {
    match user_id.as_str() {
        "u1" => Json(json!({ "value": [ { "skuId": "sku-A" }, { "skuId": "sku-X" }, { "skuId": "sku-Z" } ] }))
            .into_response(),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "backend error").into_response(),
    }
}

async fn organization() -> Response {
    Json(json!({ "value": [ { "displayName": "Contoso/Réunion" } ] })).into_response()
}

fn settings(destination: &Path) -> RunSettings {
    let mut settings = RunSettings::new(destination);
    settings.exclusions = [(SkuId::from("sku-X"), "free".to_string())].into_iter().collect();
    settings.concurrency = 2;
    settings
}

#[tokio::test]
async fn report_run_against_http_fakes() {
    let server = TestServer::spawn(true).await;
    let dest = tempfile::tempdir().unwrap();

    let summary = run(
        &server.directory(),
        &server.catalog(),
        XlsxExporter::default(),
        &settings(dest.path()),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.organization, "Contoso/Réunion");
    // sku-A matched, sku-X excluded, sku-Q unmatched.
    assert_eq!(summary.inventory_rows, 2);
    assert_eq!(summary.excluded_licenses, 1);
    assert_eq!(summary.unmatched_products, 1);
    assert_eq!(summary.user_rows, 2);
    assert_eq!(summary.unknown_licenses, 1);
    assert_eq!(summary.user_failures.len(), 1);
    assert_eq!(summary.user_failures[0].user_id, "u2");
    assert!(!summary.export_failed());

    let paths: Vec<_> = summary
        .exports
        .iter()
        .map(|o| match o {
            ExportOutcome::Written(a) => a.path.clone(),
            ExportOutcome::Failed { error, .. } => panic!("export failed: {error}"),
        })
        .collect();
    assert_eq!(
        paths,
        vec![
            dest.path().join("Contoso_Réunion-Licenses.xlsx"),
            dest.path().join("Contoso_Réunion-Users.xlsx"),
        ]
    );
    for path in paths {
        assert!(std::fs::read(path).unwrap().starts_with(b"PK"));
    }
}

#[tokio::test]
async fn unavailable_catalog_aborts_before_any_file() {
    let server = TestServer::spawn(false).await;
    let dest = tempfile::tempdir().unwrap();

    let err = run(
        &server.directory(),
        &server.catalog(),
        XlsxExporter::default(),
        &settings(dest.path()),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ReportError::CatalogUnavailable(msg) if msg.contains("503")));
    assert_eq!(std::fs::read_dir(dest.path()).unwrap().count(), 0);
}
