//! Gift-card listing dashboard.
//!
//! Reads snapshot batches of gift-card listings from a hosted PostgREST
//! table and serves them as a tabbed, sortable, filterable HTML table.

mod batches;
mod config;
mod dashboard;
mod observability;
mod row;
mod source;
mod view;

pub use batches::{
    dedupe_batch_ids, BatchSelection, FetchOutcome, RowFetch, RowFetcher, SnapshotSelector,
};
pub use config::{ConfigError, DashboardConfig, DEFAULT_BIND_ADDR, LEGACY_BASE_PATH};
pub use dashboard::{
    build_dashboard_page, dashboard_router, dashboard_router_at, render_dashboard_html,
    DashboardPage, DashboardQuery, DashboardService, EmptyState, RowsResponse,
    BATCH_PLACEHOLDER, EMPTY_BATCH_MESSAGE, NO_CONNECTIVITY_MESSAGE, NO_MATCHES_MESSAGE,
};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_source_fallback, log_source_selected,
    LogFormat, LoggingConfig, LoggingInitError, LOG_FORMAT_VAR, LOG_LEVEL_VAR, LOG_TARGET_VAR,
};
pub use row::{parse_number, resolve_tab, GiftCardRow, CARD_TABS, DEFAULT_TAB};
pub use source::{
    auth_headers, demo_rows, GiftCardSource, HttpFetcher, InMemorySource,
    ReqwestBlockingFetcher, SourceError, SupabaseConfig, SupabaseSource, UnconfiguredSource,
    DEFAULT_TABLE,
};
pub use view::{
    compare_values, dedupe_rows, derive_columns, derive_view, filter_options, locale_compare,
    sort_rows, DerivedView, FilterOptions, SortDirection, SortState, ViewFilters, ViewRequest,
    HIDDEN_COLUMNS, PREFERRED_COLUMNS,
};
