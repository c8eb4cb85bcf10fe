use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Month, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient_amount")]
    pub amount: i64,
    #[serde(default)]
    pub payment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Expense {
    pub fn month(&self) -> MonthKey {
        MonthKey::of(&self.created_at)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Income {
    pub month: MonthKey,
    #[serde(deserialize_with = "lenient_amount")]
    pub amount: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The whole persisted database. Every save rewrites all of it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalDb {
    #[serde(default)]
    pub expenses: Vec<Expense>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub merchant: Vec<String>,
    #[serde(default)]
    pub payment: Vec<String>,
    #[serde(default)]
    pub incomes: Vec<Income>,
}

impl LocalDb {
    pub fn list(&self, kind: ListKind) -> &[String] {
        match kind {
            ListKind::Category => &self.categories,
            ListKind::Merchant => &self.merchant,
            ListKind::Payment => &self.payment,
        }
    }

    pub fn list_mut(&mut self, kind: ListKind) -> &mut Vec<String> {
        match kind {
            ListKind::Category => &mut self.categories,
            ListKind::Merchant => &mut self.merchant,
            ListKind::Payment => &mut self.payment,
        }
    }

    /// Whether any expense currently carries `value` in the field backing `kind`.
    pub fn is_referenced(&self, kind: ListKind, value: &str) -> bool {
        self.expenses.iter().any(|expense| match kind {
            ListKind::Category => expense.category == value,
            ListKind::Merchant => expense.merchant.as_deref() == Some(value),
            ListKind::Payment => expense.payment == value,
        })
    }

    pub fn income_for(&self, month: MonthKey) -> Option<&Income> {
        self.incomes.iter().find(|income| income.month == month)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListKind {
    Category,
    Merchant,
    Payment,
}

impl ListKind {
    pub fn label(self) -> &'static str {
        match self {
            ListKind::Category => "Category",
            ListKind::Merchant => "Merchant",
            ListKind::Payment => "Payment method",
        }
    }
}

/// Calendar month used as the natural key for incomes and month filtering.
///
/// Serialized as `YYYY-MM`. Parsing also accepts the display form
/// (`March 2024`) so blobs written with the old label keys still load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of<T: Datelike>(date: &T) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = u8::try_from(self.month)
            .ok()
            .and_then(|month| Month::try_from(month).ok())
            .map(|month| month.name())
            .unwrap_or("Unknown");
        write!(f, "{name} {}", self.year)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMonthError(pub String);

impl fmt::Display for ParseMonthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid month \"{}\"", self.0)
    }
}

impl std::error::Error for ParseMonthError {}

impl FromStr for MonthKey {
    type Err = ParseMonthError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let value = input.trim();
        let invalid = || ParseMonthError(input.to_string());

        if let Some((year, month)) = value.split_once('-') {
            let year: i32 = year.parse().map_err(|_| invalid())?;
            let month: u32 = month.parse().map_err(|_| invalid())?;
            return MonthKey::new(year, month).ok_or_else(invalid);
        }

        let (name, year) = value.rsplit_once(' ').ok_or_else(invalid)?;
        let month: Month = name.trim().parse().map_err(|_| invalid())?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        Ok(Self {
            year,
            month: month.number_from_month(),
        })
    }
}

impl Serialize for MonthKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:04}-{:02}", self.year, self.month))
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Amounts written by older front-ends may be strings or floats.
fn lenient_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match RawAmount::deserialize(deserializer)? {
        RawAmount::Int(value) => Ok(value),
        RawAmount::Float(value) if value.fract() == 0.0 => Ok(value as i64),
        RawAmount::Float(value) => Err(serde::de::Error::custom(format!(
            "amount {value} is not a whole number"
        ))),
        RawAmount::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                log::warn!("stored amount is empty, loading it as 0");
                return Ok(0);
            }
            text.parse()
                .map_err(|_| serde::de::Error::custom(format!("amount \"{text}\" is not a number")))
        }
    }
}

/// Raw expense fields as submitted by a form, before validation.
#[derive(Clone, Debug, Default)]
pub struct ExpenseInput {
    pub name: String,
    pub category: String,
    pub merchant: Option<String>,
    pub created_at: String,
    pub amount: String,
    pub payment: String,
    pub note: Option<String>,
}

impl From<&Expense> for ExpenseInput {
    fn from(expense: &Expense) -> Self {
        Self {
            name: expense.name.clone(),
            category: expense.category.clone(),
            merchant: expense.merchant.clone(),
            created_at: expense.created_at.to_rfc3339(),
            amount: expense.amount.to_string(),
            payment: expense.payment.clone(),
            note: expense.note.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortColumn {
    #[default]
    Date,
    Name,
    Category,
    Merchant,
    Payment,
    Amount,
}

impl FromStr for SortColumn {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            "" | "date" | "createdAt" => Ok(SortColumn::Date),
            "name" => Ok(SortColumn::Name),
            "category" => Ok(SortColumn::Category),
            "merchant" => Ok(SortColumn::Merchant),
            "payment" => Ok(SortColumn::Payment),
            "amount" => Ok(SortColumn::Amount),
            other => Err(format!("unknown sort column \"{other}\"")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            "" | "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order \"{other}\"")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SortOption {
    pub column: SortColumn,
    pub order: SortOrder,
}

#[derive(Serialize)]
pub struct MonthSummary {
    pub month: MonthKey,
    pub label: String,
    pub income: i64,
    pub expense: i64,
    pub remaining: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_key_accepts_canonical_and_display_forms() {
        let canonical: MonthKey = "2024-03".parse().unwrap();
        let display: MonthKey = "March 2024".parse().unwrap();
        assert_eq!(canonical, display);
        assert_eq!(canonical.to_string(), "March 2024");
        assert!("2024-13".parse::<MonthKey>().is_err());
        assert!("Marchember 2024".parse::<MonthKey>().is_err());
    }

    #[test]
    fn month_key_serializes_canonically() {
        let key = MonthKey::new(2024, 3).unwrap();
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"2024-03\"");
    }

    #[test]
    fn legacy_blob_coerces_string_amounts() {
        let raw = r#"{
            "expenses": [{
                "id": "0b6f4a1e-3f55-4a4c-9d53-6d0f9f5b1a21",
                "name": "Coffee",
                "category": "Food",
                "createdAt": "2024-03-05T08:00:00.000Z",
                "amount": "15000"
            }],
            "categories": ["Food"],
            "incomes": [{
                "month": "March 2024",
                "amount": 500000,
                "createdAt": "2024-03-01T00:00:00.000Z"
            }]
        }"#;
        let db: LocalDb = serde_json::from_str(raw).unwrap();
        assert_eq!(db.expenses[0].amount, 15000);
        assert!(db.merchant.is_empty());
        assert!(db.payment.is_empty());
        assert_eq!(db.incomes[0].month, MonthKey::new(2024, 3).unwrap());

        let written = serde_json::to_value(&db).unwrap();
        assert_eq!(written["expenses"][0]["amount"], 15000);
        assert_eq!(written["incomes"][0]["month"], "2024-03");
    }

    #[test]
    fn empty_legacy_amount_loads_as_zero() {
        let raw = r#"{
            "id": "0b6f4a1e-3f55-4a4c-9d53-6d0f9f5b1a21",
            "name": "Coffee",
            "category": "Food",
            "createdAt": "2024-03-05T08:00:00.000Z",
            "amount": " "
        }"#;
        let expense: Expense = serde_json::from_str(raw).unwrap();
        assert_eq!(expense.amount, 0);
        assert_eq!(serde_json::to_value(&expense).unwrap()["amount"], 0);
    }

    #[test]
    fn fractional_amounts_are_rejected() {
        let raw = r#"{"month": "2024-03", "amount": 12.5, "createdAt": "2024-03-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<Income>(raw).is_err());
    }

    #[test]
    fn sort_option_parsing() {
        assert_eq!("".parse::<SortColumn>().unwrap(), SortColumn::Date);
        assert_eq!("createdAt".parse::<SortColumn>().unwrap(), SortColumn::Date);
        assert_eq!("amount".parse::<SortColumn>().unwrap(), SortColumn::Amount);
        assert!("colour".parse::<SortColumn>().is_err());
        assert_eq!("desc".parse::<SortOrder>().unwrap(), SortOrder::Desc);
    }
}
