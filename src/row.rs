//! Gift-card listing rows as returned by the `gift-cards` table.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const COL_BATCH_ID: &str = "batch_id";
pub const COL_ID: &str = "id";
pub const COL_CARD: &str = "card";
pub const COL_SELLER: &str = "seller";
pub const COL_SOURCE: &str = "source";
pub const COL_AMOUNT: &str = "amount";
pub const COL_AVAILABILITY: &str = "availability";
pub const COL_PRICE: &str = "price";
pub const COL_RETAIL_PRICE: &str = "retail-price";
pub const COL_DISCOUNTED_PRICE: &str = "discounted-price";

/// Category tabs, in sidebar order. A row belongs to the tab whose value
/// equals its `card` column.
pub const CARD_TABS: [&str; 4] = ["Steam", "Valorant", "iOS", "PSN"];
pub const DEFAULT_TAB: &str = "Steam";

/// Price columns consulted for the default tie-break, first present wins.
const PRICE_COLUMNS: [&str; 3] = [COL_PRICE, COL_DISCOUNTED_PRICE, COL_RETAIL_PRICE];

/// One listing. Column order is the order the database returned it in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GiftCardRow {
    cells: Map<String, Value>,
}

impl GiftCardRow {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.cells.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }

    pub fn batch_id(&self) -> String {
        self.text(COL_BATCH_ID)
    }

    pub fn card(&self) -> String {
        self.text(COL_CARD)
    }

    pub fn seller(&self) -> String {
        self.text(COL_SELLER)
    }

    /// Plain text of a cell; missing and null cells are empty.
    pub fn text(&self, column: &str) -> String {
        self.get(column).map(value_text).unwrap_or_default()
    }

    /// Numeric reading of a cell. Strings are accepted when they parse once
    /// currency symbols and thousands separators are removed.
    pub fn number(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(value_number)
    }

    pub fn is_truthy(&self, column: &str) -> bool {
        self.get(column).map(value_truthy).unwrap_or(false)
    }

    /// The listing price used as the default sort tie-break.
    pub fn price(&self) -> Option<f64> {
        PRICE_COLUMNS
            .iter()
            .find(|column| self.get(column).is_some_and(|value| !value.is_null()))
            .and_then(|column| self.number(column))
    }

    /// Cell text as rendered in the table.
    pub fn display_cell(&self, column: &str) -> String {
        if column == COL_AVAILABILITY {
            return self.is_truthy(column).to_string();
        }

        match self.get(column) {
            None | Some(Value::Null) => "-".to_string(),
            Some(value) => value_text(value),
        }
    }
}

pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

pub(crate) fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

pub(crate) fn value_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Canonical tab for a requested value; unknown values fall back to the
/// default tab.
pub fn resolve_tab(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|raw| CARD_TABS.iter().find(|tab| **tab == raw.trim()))
        .copied()
        .unwrap_or(DEFAULT_TAB)
}
