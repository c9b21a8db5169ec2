//! Derived table view: tab partition, filters, dedupe, and sort over a
//! fetched batch. Everything here is a pure function of its inputs.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::row::{
    value_text, GiftCardRow, COL_AMOUNT, COL_AVAILABILITY, COL_BATCH_ID, COL_CARD,
    COL_DISCOUNTED_PRICE, COL_ID, COL_RETAIL_PRICE, COL_SELLER, COL_SOURCE,
};

pub const HIDDEN_COLUMNS: [&str; 3] = [COL_BATCH_ID, COL_ID, COL_CARD];

pub const PREFERRED_COLUMNS: [&str; 6] = [
    COL_SELLER,
    COL_RETAIL_PRICE,
    COL_DISCOUNTED_PRICE,
    COL_AMOUNT,
    COL_AVAILABILITY,
    COL_SOURCE,
];

const DEDUPE_KEY_COLUMNS: [&str; 4] = [
    COL_SELLER,
    COL_AMOUNT,
    COL_RETAIL_PRICE,
    COL_DISCOUNTED_PRICE,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Column sort selection. `column == None` means the default
/// seller-then-price ordering.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SortState {
    pub column: Option<String>,
    pub direction: SortDirection,
}

impl SortState {
    pub fn by(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: Some(column.into()),
            direction,
        }
    }

    /// State after clicking a column header.
    pub fn click(&self, column: &str) -> Self {
        match &self.column {
            Some(current) if current == column => Self::by(column, self.direction.flipped()),
            _ => Self::by(column, SortDirection::Asc),
        }
    }

    pub fn is_sorted_by(&self, column: &str) -> bool {
        self.column.as_deref() == Some(column)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ViewFilters {
    pub seller: Option<String>,
    pub source: Option<String>,
    pub amount: Option<f64>,
    pub availability: Option<bool>,
}

impl ViewFilters {
    pub fn is_empty(&self) -> bool {
        self.seller.is_none()
            && self.source.is_none()
            && self.amount.is_none()
            && self.availability.is_none()
    }

    pub fn matches(&self, row: &GiftCardRow) -> bool {
        if let Some(seller) = &self.seller {
            if row.text(COL_SELLER) != *seller {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if row.text(COL_SOURCE) != *source {
                return false;
            }
        }
        if let Some(amount) = self.amount {
            if row.number(COL_AMOUNT) != Some(amount) {
                return false;
            }
        }
        if let Some(availability) = self.availability {
            if row.is_truthy(COL_AVAILABILITY) != availability {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewRequest {
    pub tab: String,
    pub filters: ViewFilters,
    pub sort: SortState,
    pub dedupe: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedView {
    pub tab: String,
    pub columns: Vec<String>,
    pub rows: Vec<GiftCardRow>,
}

impl DerivedView {
    /// Rendered cell text per row, in column order.
    pub fn display_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(|column| row.display_cell(column))
                    .collect()
            })
            .collect()
    }
}

/// Distinct values offered by the filter panel.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FilterOptions {
    pub sellers: Vec<String>,
    pub sources: Vec<String>,
    /// Scoped to the active tab; amount domains differ per card.
    pub amounts: Vec<f64>,
    pub availability: Vec<bool>,
}

pub fn derive_view(rows: &[GiftCardRow], request: &ViewRequest) -> DerivedView {
    let mut selected: Vec<GiftCardRow> = rows
        .iter()
        .filter(|row| row.card() == request.tab)
        .filter(|row| request.filters.matches(row))
        .cloned()
        .collect();

    if request.dedupe {
        selected = dedupe_rows(selected);
    }
    sort_rows(&mut selected, &request.sort);

    DerivedView {
        tab: request.tab.clone(),
        columns: derive_columns(rows),
        rows: selected,
    }
}

/// Columns of the first row, hidden columns removed, preferred columns
/// moved to the front.
pub fn derive_columns(rows: &[GiftCardRow]) -> Vec<String> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };

    let visible: Vec<&str> = first
        .columns()
        .filter(|column| !HIDDEN_COLUMNS.contains(column))
        .collect();

    let mut ordered: Vec<String> = PREFERRED_COLUMNS
        .iter()
        .filter(|preferred| visible.contains(*preferred))
        .map(|preferred| (*preferred).to_string())
        .collect();
    ordered.extend(
        visible
            .iter()
            .filter(|column| !PREFERRED_COLUMNS.contains(*column))
            .map(|column| (*column).to_string()),
    );
    ordered
}

/// Drops later rows repeating an earlier (seller, amount, retail-price,
/// discounted-price) tuple.
pub fn dedupe_rows(rows: Vec<GiftCardRow>) -> Vec<GiftCardRow> {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.into_iter()
        .filter(|row| seen.insert(dedupe_key(row)))
        .collect()
}

fn dedupe_key(row: &GiftCardRow) -> [Option<String>; 4] {
    DEDUPE_KEY_COLUMNS.map(|column| row.get(column).map(Value::to_string))
}

/// Stable sort; equal rows keep their relative order in both directions.
pub fn sort_rows(rows: &mut [GiftCardRow], sort: &SortState) {
    match &sort.column {
        None => rows.sort_by(default_order),
        Some(column) => rows.sort_by(|a, b| {
            let ord = compare_values(a.get(column), b.get(column));
            match sort.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        }),
    }
}

fn default_order(a: &GiftCardRow, b: &GiftCardRow) -> Ordering {
    a.seller()
        .cmp(&b.seller())
        .then_with(|| match (a.price(), b.price()) {
            (Some(pa), Some(pb)) => pa.total_cmp(&pb),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
}

pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => x.to_string().cmp(&y.to_string()),
        },
        (Some(Value::String(x)), Some(Value::String(y))) => locale_compare(x, y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => {
            let x = a.map(value_text).unwrap_or_default();
            let y = b.map(value_text).unwrap_or_default();
            x.cmp(&y)
        }
    }
}

/// Case-insensitive comparison; on a tie lowercase sorts before uppercase.
///
/// Only case is folded. Accented letters keep their code-point order, so
/// `"é"` sorts after `"z"` rather than next to `"e"`.
pub fn locale_compare(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| b.cmp(a))
}

pub fn filter_options(rows: &[GiftCardRow], tab: &str) -> FilterOptions {
    let mut sellers = distinct_text(rows, COL_SELLER);
    let mut sources = distinct_text(rows, COL_SOURCE);
    sellers.sort_by(|a, b| locale_compare(a, b));
    sources.sort_by(|a, b| locale_compare(a, b));

    let mut amounts: Vec<f64> = Vec::new();
    for row in rows.iter().filter(|row| row.card() == tab) {
        if let Some(amount) = row.number(COL_AMOUNT) {
            if !amounts.contains(&amount) {
                amounts.push(amount);
            }
        }
    }
    amounts.sort_by(f64::total_cmp);

    let mut availability: Vec<bool> = rows
        .iter()
        .filter(|row| row.get(COL_AVAILABILITY).is_some())
        .map(|row| row.is_truthy(COL_AVAILABILITY))
        .collect();
    availability.sort_unstable();
    availability.dedup();

    FilterOptions {
        sellers,
        sources,
        amounts,
        availability,
    }
}

fn distinct_text(rows: &[GiftCardRow], column: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    rows.iter()
        .map(|row| row.text(column))
        .filter(|value| !value.is_empty())
        .filter(|value| seen.insert(value.clone()))
        .collect()
}
