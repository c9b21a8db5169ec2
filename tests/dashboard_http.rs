use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use giftcard_dashboard::{
    dashboard_router, dashboard_router_at, GiftCardRow, GiftCardSource, InMemorySource,
    SourceError, UnconfiguredSource, EMPTY_BATCH_MESSAGE, NO_CONNECTIVITY_MESSAGE,
};
use serde_json::{json, Value};
use tower::util::ServiceExt;

fn row(
    batch: &str,
    card: &str,
    seller: &str,
    amount: i64,
    discounted: &str,
    available: bool,
) -> GiftCardRow {
    serde_json::from_value(json!({
        "id": format!("{batch}-{card}-{seller}-{amount}"),
        "batch_id": batch,
        "card": card,
        "seller": seller,
        "amount": amount,
        "retail-price": format!("${amount}"),
        "discounted-price": discounted,
        "availability": available,
        "source": format!("{}.com", seller.to_lowercase()),
    }))
    .expect("row json should decode")
}

fn sample_rows() -> Vec<GiftCardRow> {
    vec![
        row("2024-06-01T00:00Z", "Steam", "G2A", 20, "$18.10", true),
        row("2024-06-01T00:00Z", "Steam", "Eneba", 20, "$17.45", true),
        row("2024-06-01T00:00Z", "Steam", "Eneba", 20, "$17.45", true),
        row("2024-06-01T00:00Z", "Steam", "Kinguin", 50, "$44.90", false),
        row("2024-06-01T00:00Z", "PSN", "Eneba", 50, "$45.60", true),
        row("2024-05-01T00:00Z", "Steam", "Driffle", 10, "$9.00", true),
    ]
}

async fn get(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn get_json(app: Router, uri: &str) -> Value {
    let (status, body) = get(app, uri).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_str(&body).unwrap()
}

fn cells(json: &Value, column: &str) -> Vec<String> {
    let idx = json["columns"]
        .as_array()
        .unwrap()
        .iter()
        .position(|c| c == column)
        .unwrap();
    json["rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r[idx].as_str().unwrap().to_string())
        .collect()
}

struct BatchesOnlySource;

impl GiftCardSource for BatchesOnlySource {
    fn batch_ids(&self) -> Result<Vec<String>, SourceError> {
        Ok(vec!["2024-06-01T00:00Z".to_string()])
    }

    fn rows_for_batch(&self, batch_id: &str) -> Result<Vec<GiftCardRow>, SourceError> {
        Err(SourceError::Status {
            url: format!("https://db.invalid/rest/v1/gift-cards?batch_id=eq.{batch_id}"),
            status: 503,
        })
    }
}

struct BatchListDownSource;

impl GiftCardSource for BatchListDownSource {
    fn batch_ids(&self) -> Result<Vec<String>, SourceError> {
        Err(SourceError::HttpRequest {
            url: "https://db.invalid/rest/v1/gift-cards".to_string(),
            message: "connection reset".to_string(),
        })
    }

    fn rows_for_batch(&self, batch_id: &str) -> Result<Vec<GiftCardRow>, SourceError> {
        Ok(vec![row(batch_id, "Steam", "G2A", 10, "$9.10", true)])
    }
}

#[tokio::test]
async fn dashboard_page_renders_tabs_filters_and_table() {
    let app = dashboard_router(Arc::new(InMemorySource::new(sample_rows())));
    let (status, text) = get(app, "/dashboard").await;

    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("<table id=\"gift-card-table\""));
    assert!(text.contains("Gift Card Table"));
    assert!(text.contains("filters-form"));
    assert!(text.contains("name=\"seller\""));
    assert!(text.contains("name=\"source\""));
    assert!(text.contains("name=\"amount\""));
    assert!(text.contains("name=\"availability\""));
    assert!(text.contains("Clear all"));
    for tab in ["Steam", "Valorant", "iOS", "PSN"] {
        assert!(text.contains(&format!("tab={tab}")));
    }
    assert!(text.contains("<option value=\"2024-06-01T00:00Z\" selected>"));
    assert!(text.contains("<option value=\"2024-05-01T00:00Z\">"));
    assert!(!text.contains(">batch_id</a>"));
    assert!(!text.contains(">card</a>"));
}

#[tokio::test]
async fn rows_endpoint_defaults_to_newest_batch_and_dedupes() {
    let app = dashboard_router(Arc::new(InMemorySource::new(sample_rows())));
    let json = get_json(app, "/dashboard/rows").await;

    assert_eq!(json["batch_id"], "2024-06-01T00:00Z");
    assert_eq!(json["tab"], "Steam");
    assert_eq!(
        json["columns"],
        json!(["seller", "retail-price", "discounted-price", "amount", "availability", "source"])
    );
    assert_eq!(cells(&json, "seller"), vec!["Eneba", "G2A", "Kinguin"]);
    assert_eq!(cells(&json, "availability"), vec!["true", "true", "false"]);
    assert_eq!(json["fetch_outcome"], "committed");
}

#[tokio::test]
async fn rows_endpoint_applies_filters_and_explicit_sort() {
    let app = dashboard_router(Arc::new(InMemorySource::new(sample_rows())));
    let json = get_json(
        app,
        "/dashboard/rows?tab=Steam&amount=20&availability=true&sort=discounted-price&dir=desc&dedupe=false",
    )
    .await;

    assert_eq!(cells(&json, "seller"), vec!["G2A", "Eneba", "Eneba"]);
    assert_eq!(
        cells(&json, "discounted-price"),
        vec!["$18.10", "$17.45", "$17.45"]
    );
}

#[tokio::test]
async fn rows_endpoint_honours_selected_batch_and_tab() {
    let app = dashboard_router(Arc::new(InMemorySource::new(sample_rows())));
    let json = get_json(app.clone(), "/dashboard/rows?batch=2024-05-01T00%3A00Z").await;
    assert_eq!(json["batch_id"], "2024-05-01T00:00Z");
    assert_eq!(cells(&json, "seller"), vec!["Driffle"]);

    let json = get_json(app, "/dashboard/rows?tab=PSN").await;
    assert_eq!(cells(&json, "seller"), vec!["Eneba"]);
}

#[tokio::test]
async fn batches_endpoint_lists_distinct_ids_newest_first() {
    let app = dashboard_router(Arc::new(InMemorySource::new(sample_rows())));
    let json = get_json(app, "/dashboard/batches").await;

    assert_eq!(
        json["batches"],
        json!(["2024-06-01T00:00Z", "2024-05-01T00:00Z"])
    );
    assert_eq!(json["active"], "2024-06-01T00:00Z");
}

#[tokio::test]
async fn unconfigured_source_renders_connectivity_message() {
    let app = dashboard_router(Arc::new(UnconfiguredSource));
    let (status, text) = get(app.clone(), "/dashboard").await;

    assert_eq!(status, StatusCode::OK);
    assert!(text.contains(NO_CONNECTIVITY_MESSAGE));
    assert!(text.contains("Select Date"));
    assert!(!text.contains(EMPTY_BATCH_MESSAGE));

    let json = get_json(app, "/dashboard/rows").await;
    assert_eq!(json["empty_state"], "no_connectivity");
    assert_eq!(json["batch_id"], Value::Null);
}

#[tokio::test]
async fn failed_row_fetch_with_known_batches_reports_empty_batch() {
    let app = dashboard_router(Arc::new(BatchesOnlySource));
    let (status, text) = get(app.clone(), "/dashboard").await;

    assert_eq!(status, StatusCode::OK);
    assert!(text.contains(EMPTY_BATCH_MESSAGE));
    assert!(!text.contains(NO_CONNECTIVITY_MESSAGE));

    let json = get_json(app, "/dashboard/rows").await;
    assert_eq!(json["empty_state"], "empty_batch");
    assert_eq!(json["fetch_outcome"], "failed");
}

#[tokio::test]
async fn base_path_prefixes_routes_and_links() {
    let app = dashboard_router_at(Arc::new(InMemorySource::new(sample_rows())), "/scraper");

    let (status, text) = get(app.clone(), "/scraper/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("action=\"/scraper/dashboard\""));
    assert!(text.contains("href=\"/scraper/dashboard?"));

    let (status, _) = get(app, "/dashboard").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn root_redirects_to_dashboard() {
    let app = dashboard_router(Arc::new(UnconfiguredSource));
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()["location"], "/dashboard");
}

#[tokio::test]
async fn seller_filter_keeps_surrounding_whitespace() {
    let rows = vec![
        row("2024-06-01T00:00Z", "Steam", " Eneba", 20, "$17.45", true),
        row("2024-06-01T00:00Z", "Steam", "G2A", 20, "$18.10", true),
    ];
    let app = dashboard_router(Arc::new(InMemorySource::new(rows)));

    let json = get_json(app.clone(), "/dashboard/rows?seller=%20Eneba").await;
    assert_eq!(cells(&json, "seller"), vec![" Eneba"]);

    let (_, text) = get(app, "/dashboard").await;
    assert!(text.contains("<option value=\" Eneba\">"));
}

#[tokio::test]
async fn requested_batch_rows_render_when_batch_list_fails() {
    let app = dashboard_router(Arc::new(BatchListDownSource));

    let json = get_json(app.clone(), "/dashboard/rows?batch=b").await;
    assert_eq!(json["batch_id"], "b");
    assert_eq!(json["empty_state"], Value::Null);
    assert_eq!(cells(&json, "seller"), vec!["G2A"]);

    let (_, text) = get(app, "/dashboard").await;
    assert!(text.contains(NO_CONNECTIVITY_MESSAGE));
}

#[tokio::test]
async fn reload_reads_rows_added_since_first_view() {
    let source = InMemorySource::new(vec![row("b", "Steam", "A", 10, "$9.00", true)]);
    let app = dashboard_router(Arc::new(source.clone()));

    let json = get_json(app.clone(), "/dashboard/rows").await;
    assert_eq!(cells(&json, "seller"), vec!["A"]);

    source.replace_rows(vec![
        row("b", "Steam", "A", 10, "$9.00", true),
        row("b", "Steam", "B", 10, "$9.50", true),
    ]);

    let json = get_json(app, "/dashboard/rows").await;
    assert_eq!(cells(&json, "seller"), vec!["A", "B"]);
    assert_eq!(json["fetch_outcome"], "committed");
}
