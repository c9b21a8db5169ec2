//! Dashboard page model, HTML rendering and HTTP routes.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use url::form_urlencoded;

use crate::batches::{BatchSelection, FetchOutcome, SnapshotSelector, RowFetcher};
use crate::config::parse_bool;
use crate::row::{parse_number, resolve_tab, GiftCardRow, CARD_TABS};
use crate::source::GiftCardSource;
use crate::view::{
    derive_view, filter_options, DerivedView, FilterOptions, SortDirection, SortState,
    ViewFilters, ViewRequest,
};

pub const NO_CONNECTIVITY_MESSAGE: &str =
    "No data available. Unable to reach the gift card database.";
pub const EMPTY_BATCH_MESSAGE: &str = "No data found for the selected timestamp";
pub const NO_MATCHES_MESSAGE: &str = "No listings match the current filters";
pub const BATCH_PLACEHOLDER: &str = "Select Date";

/// Raw query string of every dashboard route. Blank values mean "unset",
/// which is what the filter panel's "All" options submit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DashboardQuery {
    pub batch: Option<String>,
    pub tab: Option<String>,
    pub seller: Option<String>,
    pub source: Option<String>,
    pub amount: Option<String>,
    pub availability: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub dedupe: Option<String>,
}

impl DashboardQuery {
    pub fn view_request(&self) -> ViewRequest {
        let filters = ViewFilters {
            seller: exact_value(&self.seller),
            source: exact_value(&self.source),
            amount: non_blank(&self.amount).and_then(|raw| parse_number(&raw)),
            availability: non_blank(&self.availability).and_then(|raw| parse_bool(&raw)),
        };

        let sort = match non_blank(&self.sort) {
            Some(column) => SortState::by(
                column,
                non_blank(&self.dir)
                    .and_then(|raw| SortDirection::parse(&raw))
                    .unwrap_or_default(),
            ),
            None => SortState::default(),
        };

        ViewRequest {
            tab: resolve_tab(self.tab.as_deref()).to_string(),
            filters,
            sort,
            dedupe: non_blank(&self.dedupe)
                .and_then(|raw| parse_bool(&raw))
                .unwrap_or(true),
        }
    }
}

/// Untrimmed value for exact-match filters; whitespace-only still means unset.
fn exact_value(value: &Option<String>) -> Option<String> {
    value
        .as_ref()
        .filter(|raw| !raw.trim().is_empty())
        .cloned()
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyState {
    /// No rows, and no batch identifiers could be loaded either.
    NoConnectivity,
    /// Batches exist but the selected one returned no rows.
    EmptyBatch,
    /// The batch has rows but none survive the tab and filters.
    NoMatches,
}

impl EmptyState {
    pub fn message(self) -> &'static str {
        match self {
            Self::NoConnectivity => NO_CONNECTIVITY_MESSAGE,
            Self::EmptyBatch => EMPTY_BATCH_MESSAGE,
            Self::NoMatches => NO_MATCHES_MESSAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardPage {
    pub selection: BatchSelection,
    pub request: ViewRequest,
    pub view: DerivedView,
    pub options: FilterOptions,
    pub tab_counts: Vec<(&'static str, usize)>,
    pub batch_row_count: usize,
    pub empty_state: Option<EmptyState>,
    pub fetch_outcome: Option<FetchOutcome>,
}

pub fn build_dashboard_page(
    selection: BatchSelection,
    rows: &[GiftCardRow],
    query: &DashboardQuery,
    fetch_outcome: Option<FetchOutcome>,
) -> DashboardPage {
    let request = query.view_request();
    let view = derive_view(rows, &request);
    let options = filter_options(rows, &request.tab);
    let tab_counts = CARD_TABS
        .iter()
        .map(|tab| (*tab, rows.iter().filter(|row| row.card() == *tab).count()))
        .collect();

    let empty_state = if rows.is_empty() {
        if selection.batches.is_empty() {
            Some(EmptyState::NoConnectivity)
        } else {
            Some(EmptyState::EmptyBatch)
        }
    } else if view.rows.is_empty() {
        Some(EmptyState::NoMatches)
    } else {
        None
    };

    DashboardPage {
        selection,
        request,
        view,
        options,
        tab_counts,
        batch_row_count: rows.len(),
        empty_state,
        fetch_outcome,
    }
}

/// Snapshot selection plus the row fetcher shared by all requests.
pub struct DashboardService {
    selector: SnapshotSelector,
    fetcher: RowFetcher,
}

impl DashboardService {
    pub fn new(source: Arc<dyn GiftCardSource>) -> Self {
        Self {
            selector: SnapshotSelector::new(Arc::clone(&source)),
            fetcher: RowFetcher::new(source),
        }
    }

    /// Blocking; call from a blocking context.
    pub fn page(&self, query: &DashboardQuery) -> DashboardPage {
        let selection = self.selector.select(query.batch.as_deref());
        match selection.active.clone() {
            Some(batch_id) => {
                let fetch = self.fetcher.fetch(&batch_id);
                build_dashboard_page(selection, &fetch.rows, query, Some(fetch.outcome))
            }
            None => build_dashboard_page(selection, &[], query, None),
        }
    }

    pub fn batches(&self, requested: Option<&str>) -> BatchSelection {
        self.selector.select(requested)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowsResponse {
    pub batch_id: Option<String>,
    pub tab: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub empty_state: Option<EmptyState>,
    pub message: Option<&'static str>,
    pub fetch_outcome: Option<FetchOutcome>,
}

impl From<&DashboardPage> for RowsResponse {
    fn from(page: &DashboardPage) -> Self {
        Self {
            batch_id: page.selection.active.clone(),
            tab: page.view.tab.clone(),
            columns: page.view.columns.clone(),
            rows: page.view.display_rows(),
            empty_state: page.empty_state,
            message: page.empty_state.map(EmptyState::message),
            fetch_outcome: page.fetch_outcome,
        }
    }
}

pub fn dashboard_router(source: Arc<dyn GiftCardSource>) -> Router {
    dashboard_router_at(source, "")
}

/// Routes mounted under `base_path` (empty for the root).
pub fn dashboard_router_at(source: Arc<dyn GiftCardSource>, base_path: &str) -> Router {
    let state = DashboardAppState {
        service: Arc::new(DashboardService::new(source)),
        base_path: Arc::from(base_path),
    };

    let routes = Router::new()
        .route("/", get(redirect_to_dashboard))
        .route("/dashboard", get(get_dashboard_html))
        .route("/dashboard/batches", get(get_batches))
        .route("/dashboard/rows", get(get_rows))
        .with_state(state);

    if base_path.is_empty() {
        routes
    } else {
        Router::new().nest(base_path, routes)
    }
}

#[derive(Clone)]
struct DashboardAppState {
    service: Arc<DashboardService>,
    base_path: Arc<str>,
}

async fn redirect_to_dashboard(State(state): State<DashboardAppState>) -> Redirect {
    Redirect::to(&format!("{}/dashboard", state.base_path))
}

async fn get_dashboard_html(
    State(state): State<DashboardAppState>,
    Query(query): Query<DashboardQuery>,
) -> Response {
    info!(
        component = "dashboard_server",
        event = "http.dashboard.request",
        batch = ?query.batch,
        tab = ?query.tab
    );

    match load_page(&state, query).await {
        Ok(page) => Html(render_dashboard_html(&page, &state.base_path)).into_response(),
        Err(status) => status.into_response(),
    }
}

async fn get_rows(
    State(state): State<DashboardAppState>,
    Query(query): Query<DashboardQuery>,
) -> Response {
    info!(
        component = "dashboard_server",
        event = "http.rows.request",
        batch = ?query.batch,
        tab = ?query.tab
    );

    match load_page(&state, query).await {
        Ok(page) => Json(RowsResponse::from(&page)).into_response(),
        Err(status) => status.into_response(),
    }
}

async fn get_batches(
    State(state): State<DashboardAppState>,
    Query(query): Query<DashboardQuery>,
) -> Response {
    info!(
        component = "dashboard_server",
        event = "http.batches.request"
    );

    let service = Arc::clone(&state.service);
    let requested = query.batch;
    match tokio::task::spawn_blocking(move || service.batches(requested.as_deref())).await {
        Ok(selection) => Json(selection).into_response(),
        Err(err) => {
            error!(
                component = "dashboard_server",
                event = "http.batches.error",
                error = %err
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn load_page(
    state: &DashboardAppState,
    query: DashboardQuery,
) -> Result<DashboardPage, StatusCode> {
    let service = Arc::clone(&state.service);
    tokio::task::spawn_blocking(move || service.page(&query))
        .await
        .map_err(|err| {
            error!(
                component = "dashboard_server",
                event = "http.page.error",
                error = %err
            );
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// Query-string state carried by every link on the page.
#[derive(Debug, Clone)]
struct LinkState {
    batch: Option<String>,
    tab: String,
    filters: ViewFilters,
    sort: SortState,
}

impl LinkState {
    fn from_page(page: &DashboardPage) -> Self {
        Self {
            batch: page.selection.active.clone(),
            tab: page.request.tab.clone(),
            filters: page.request.filters.clone(),
            sort: page.request.sort.clone(),
        }
    }

    /// Switching tabs keeps every filter except amount, whose options
    /// differ per card.
    fn with_tab(&self, tab: &str) -> Self {
        let mut next = self.clone();
        next.tab = tab.to_string();
        next.filters.amount = None;
        next
    }

    fn with_sort(&self, sort: SortState) -> Self {
        let mut next = self.clone();
        next.sort = sort;
        next
    }

    fn cleared(&self) -> Self {
        let mut next = self.clone();
        next.filters = ViewFilters::default();
        next
    }

    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(batch) = &self.batch {
            pairs.push(("batch", batch.clone()));
        }
        pairs.push(("tab", self.tab.clone()));
        if let Some(seller) = &self.filters.seller {
            pairs.push(("seller", seller.clone()));
        }
        if let Some(source) = &self.filters.source {
            pairs.push(("source", source.clone()));
        }
        if let Some(amount) = self.filters.amount {
            pairs.push(("amount", format_amount(amount)));
        }
        if let Some(availability) = self.filters.availability {
            pairs.push(("availability", availability.to_string()));
        }
        if let Some(column) = &self.sort.column {
            pairs.push(("sort", column.clone()));
            pairs.push(("dir", self.sort.direction.as_str().to_string()));
        }
        pairs
    }

    fn href(&self, base_path: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.pairs())
            .finish();
        format!("{base_path}/dashboard?{query}")
    }

    /// Hidden inputs for a form that only changes `skip`.
    fn hidden_inputs(&self, skip: &[&str]) -> String {
        self.pairs()
            .iter()
            .filter(|(key, _)| !skip.contains(key))
            .map(|(key, value)| {
                format!(
                    "<input type=\"hidden\" name=\"{}\" value=\"{}\">",
                    key,
                    escape_html(value)
                )
            })
            .collect()
    }
}

pub fn render_dashboard_html(page: &DashboardPage, base_path: &str) -> String {
    let now_utc = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let links = LinkState::from_page(page);
    let action = format!("{base_path}/dashboard");

    let mut out = String::new();
    out.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">\n");
    out.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str("<title>Gift Card Table</title>\n");
    out.push_str("<style>:root{--bg:#f4f5f7;--card:#ffffff;--ink:#1b1f24;--muted:#5f6a73;--line:#d7dce1;--side:#eceff3;--head:#f0f2f5;--accent:#0c5f78}*{box-sizing:border-box}body{margin:0;color:var(--ink);font-family:\"Inter\",\"Segoe UI\",sans-serif;background:var(--bg);min-height:100vh}.layout{display:flex;min-height:100vh}.sidebar{position:fixed;left:0;top:0;bottom:0;width:180px;background:var(--side);border-right:1px solid var(--line);padding:80px 10px 10px;display:flex;flex-direction:column;gap:6px}.tab{display:flex;justify-content:space-between;padding:8px 10px;border-radius:8px;color:var(--ink);text-decoration:none;font-weight:500}.tab:hover{background:#dde3e9}.tab.active{background:var(--card);box-shadow:0 1px 4px rgba(0,0,0,.08)}.tab .count{color:var(--muted);font-size:.8rem}.content{flex:1;margin-left:180px;display:flex;flex-direction:column}header{position:sticky;top:0;z-index:2;height:64px;display:flex;align-items:center;justify-content:space-between;padding:0 32px;background:var(--card);border-bottom:1px solid var(--line)}header h1{margin:0;font-size:1.5rem;letter-spacing:-.01em}.batch-form select{padding:7px 10px;border:1px solid var(--line);border-radius:8px;background:var(--card);font:inherit}main{display:flex;gap:24px;padding:32px;align-items:flex-start}.filters{width:220px;flex:none;background:var(--card);border:1px solid var(--line);border-radius:12px;padding:14px}.filters h2{margin:0 0 10px;font-size:1rem}.filters label{display:block;font-size:.8rem;color:var(--muted);margin:10px 0 4px}.filters select{width:100%;padding:6px 8px;border:1px solid var(--line);border-radius:6px;font:inherit}.clear-all{display:inline-block;margin-top:14px;color:var(--accent);font-size:.85rem}.table-card{flex:1;max-width:1100px;background:var(--card);border:1px solid var(--line);border-radius:12px;overflow:auto}table{width:100%;border-collapse:collapse}caption{caption-side:bottom;padding:10px;color:var(--muted);font-size:.8rem}thead th{background:var(--head);text-align:left;padding:10px 14px;border-bottom:1px solid var(--line);font-size:.85rem;white-space:nowrap}thead th a{color:inherit;text-decoration:none}thead th a:hover{color:var(--accent)}tbody td{padding:9px 14px;border-bottom:1px solid var(--line);font-size:.88rem;white-space:nowrap}tbody td.seller{font-weight:700;color:var(--accent)}.empty{padding:28px;color:var(--muted)}.meta{padding:0 32px 24px;color:var(--muted);font-size:.78rem}</style>\n");
    out.push_str("</head><body><div class=\"layout\">\n");

    out.push_str("<nav class=\"sidebar\">");
    for (tab, count) in &page.tab_counts {
        let class = if *tab == page.request.tab {
            "tab active"
        } else {
            "tab"
        };
        out.push_str(&format!(
            "<a class=\"{class}\" href=\"{}\">{}<span class=\"count\">{count}</span></a>",
            escape_html(&links.with_tab(tab).href(base_path)),
            escape_html(tab)
        ));
    }
    out.push_str("</nav>\n");

    out.push_str("<div class=\"content\">\n<header><h1>Gift Card Table</h1>");
    out.push_str(&render_batch_form(page, &links, &action));
    out.push_str("</header>\n<main>\n");

    out.push_str(&render_filter_panel(page, &links, &action, base_path));

    out.push_str("<section class=\"table-card\">");
    match page.empty_state {
        Some(state) => {
            out.push_str("<div class=\"empty\" id=\"empty-state\">");
            out.push_str(&escape_html(state.message()));
            out.push_str("</div>");
        }
        None => out.push_str(&render_table(page, &links, base_path)),
    }
    out.push_str("</section>\n</main>\n");

    out.push_str("<div class=\"meta\">");
    out.push_str(&format!(
        "<span>Rows in snapshot: {}</span> · <span>Generated: {}</span>",
        page.batch_row_count,
        escape_html(&now_utc)
    ));
    out.push_str("</div>\n</div></div></body></html>\n");
    out
}

fn render_batch_form(page: &DashboardPage, links: &LinkState, action: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "<form class=\"batch-form\" method=\"get\" action=\"{}\">",
        escape_html(action)
    ));
    out.push_str(&links.hidden_inputs(&["batch"]));
    out.push_str("<select name=\"batch\" onchange=\"this.form.submit()\">");

    if page.selection.batches.is_empty() {
        out.push_str(&format!(
            "<option value=\"\" selected disabled>{}</option>",
            BATCH_PLACEHOLDER
        ));
    }

    let active = page.selection.active.as_deref();
    // A requested batch outside the known list still shows as selected.
    if let Some(active) = active {
        if !page.selection.batches.iter().any(|batch| batch == active) {
            out.push_str(&format!(
                "<option value=\"{0}\" selected>{0}</option>",
                escape_html(active)
            ));
        }
    }
    for batch in &page.selection.batches {
        let selected = if Some(batch.as_str()) == active {
            " selected"
        } else {
            ""
        };
        out.push_str(&format!(
            "<option value=\"{0}\"{selected}>{0}</option>",
            escape_html(batch)
        ));
    }
    out.push_str("</select><noscript><button type=\"submit\">Show</button></noscript></form>");
    out
}

fn render_filter_panel(
    page: &DashboardPage,
    links: &LinkState,
    action: &str,
    base_path: &str,
) -> String {
    let filters = &page.request.filters;
    let options = &page.options;

    let mut out = String::new();
    out.push_str(&format!(
        "<aside class=\"filters\"><h2>Filters</h2><form id=\"filters-form\" method=\"get\" action=\"{}\">",
        escape_html(action)
    ));
    out.push_str(&links.hidden_inputs(&["seller", "source", "amount", "availability"]));

    let seller_options: Vec<(String, String)> = options
        .sellers
        .iter()
        .map(|seller| (seller.clone(), seller.clone()))
        .collect();
    out.push_str(&render_select(
        "seller",
        "Seller",
        &seller_options,
        filters.seller.as_deref(),
    ));

    let source_options: Vec<(String, String)> = options
        .sources
        .iter()
        .map(|source| (source.clone(), source.clone()))
        .collect();
    out.push_str(&render_select(
        "source",
        "Source",
        &source_options,
        filters.source.as_deref(),
    ));

    let amount_options: Vec<(String, String)> = options
        .amounts
        .iter()
        .map(|amount| (format_amount(*amount), format_amount(*amount)))
        .collect();
    let selected_amount = filters.amount.map(format_amount);
    out.push_str(&render_select(
        "amount",
        "Amount",
        &amount_options,
        selected_amount.as_deref(),
    ));

    let availability_options: Vec<(String, String)> = options
        .availability
        .iter()
        .map(|value| (value.to_string(), value.to_string()))
        .collect();
    let selected_availability = filters.availability.map(|value| value.to_string());
    out.push_str(&render_select(
        "availability",
        "Availability",
        &availability_options,
        selected_availability.as_deref(),
    ));

    out.push_str("<noscript><button type=\"submit\">Apply</button></noscript></form>");
    out.push_str(&format!(
        "<a class=\"clear-all\" id=\"clear-all\" href=\"{}\">Clear all</a>",
        escape_html(&links.cleared().href(base_path))
    ));
    out.push_str("</aside>\n");
    out
}

fn render_select(
    name: &str,
    label: &str,
    options: &[(String, String)],
    selected: Option<&str>,
) -> String {
    let mut out = format!(
        "<label for=\"filter-{name}\">{label}</label><select id=\"filter-{name}\" name=\"{name}\" onchange=\"this.form.submit()\"><option value=\"\">All</option>"
    );
    for (value, text) in options {
        let marker = if Some(value.as_str()) == selected {
            " selected"
        } else {
            ""
        };
        out.push_str(&format!(
            "<option value=\"{}\"{marker}>{}</option>",
            escape_html(value),
            escape_html(text)
        ));
    }
    out.push_str("</select>");
    out
}

fn render_table(page: &DashboardPage, links: &LinkState, base_path: &str) -> String {
    let mut out = String::new();
    out.push_str("<table id=\"gift-card-table\"><caption>Gift Card Analytics</caption><thead><tr>");
    for column in &page.view.columns {
        let sort = &page.request.sort;
        let indicator = if sort.is_sorted_by(column) {
            match sort.direction {
                SortDirection::Asc => " ▲",
                SortDirection::Desc => " ▼",
            }
        } else {
            ""
        };
        let href = links.with_sort(sort.click(column)).href(base_path);
        out.push_str(&format!(
            "<th><a href=\"{}\">{}{indicator}</a></th>",
            escape_html(&href),
            escape_html(column)
        ));
    }
    out.push_str("</tr></thead><tbody>\n");

    for (idx, cells) in page.view.display_rows().iter().enumerate() {
        out.push_str(&format!("<tr data-row=\"{idx}\">"));
        for (column, value) in page.view.columns.iter().zip(cells) {
            if column == "seller" {
                out.push_str("<td class=\"seller\">");
            } else {
                out.push_str("<td>");
            }
            out.push_str(&escape_html(value));
            out.push_str("</td>");
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody></table>");
    out
}

fn format_amount(amount: f64) -> String {
    format!("{amount}")
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
