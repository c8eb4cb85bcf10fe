use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Expense, ExpenseInput};

pub const MAX_NAME_CHARS: usize = 50;
/// Largest integer a JSON number holds exactly in every client (2^53 - 1).
pub const MAX_AMOUNT: i64 = 9_007_199_254_740_991;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Turn raw form input into an [`Expense`] carrying `id`.
///
/// Both the create and edit paths go through here, so a stored expense always
/// satisfies the same rules. `now` supplies the time of day when the form only
/// sent a calendar date.
pub fn validate_expense(
    id: Uuid,
    input: &ExpenseInput,
    now: DateTime<Utc>,
) -> Result<Expense, ValidationError> {
    if id.is_nil() {
        return Err(ValidationError::new("id", "must be a generated identifier"));
    }

    let name = input.name.trim();
    if name.is_empty() {
        return Err(ValidationError::new("name", "Expense name is required"));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(ValidationError::new(
            "name",
            format!("must be at most {MAX_NAME_CHARS} characters"),
        ));
    }

    let category = input.category.trim();
    if category.is_empty() {
        return Err(ValidationError::new("category", "Please pick a category"));
    }

    let payment = input.payment.trim();
    if payment.is_empty() {
        return Err(ValidationError::new("payment", "Please pick a payment method"));
    }

    let created_at = parse_created_at(&input.created_at, now)?;
    let amount = parse_amount(&input.amount)?;

    Ok(Expense {
        id,
        name: name.to_string(),
        category: category.to_string(),
        merchant: non_empty(input.merchant.as_deref()),
        created_at,
        amount,
        payment: payment.to_string(),
        note: non_empty(input.note.as_deref()),
    })
}

/// Accepts a full RFC 3339 timestamp or a bare `YYYY-MM-DD` date picker value.
pub fn parse_created_at(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ValidationError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(ValidationError::new("createdAt", "Please pick a date."));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|date| date.and_time(now.time()).and_utc())
        .map_err(|_| ValidationError::new("createdAt", format!("\"{value}\" is not a valid date")))
}

pub fn parse_amount(input: &str) -> Result<i64, ValidationError> {
    let value = input.trim();
    let amount: i64 = value
        .parse()
        .map_err(|_| ValidationError::new("amount", "must be a whole number"))?;
    if amount <= 0 {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }
    if amount > MAX_AMOUNT {
        return Err(ValidationError::new("amount", "amount too large"));
    }
    Ok(amount)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 14, 30, 0).unwrap()
    }

    fn input() -> ExpenseInput {
        ExpenseInput {
            name: "  Coffee ".to_string(),
            category: "Food".to_string(),
            merchant: Some(String::new()),
            created_at: "2024-03-05T08:00:00.000Z".to_string(),
            amount: "15000".to_string(),
            payment: "Cash".to_string(),
            note: None,
        }
    }

    #[test]
    fn valid_input_is_trimmed_and_typed() {
        let expense = validate_expense(Uuid::new_v4(), &input(), now()).unwrap();
        assert_eq!(expense.name, "Coffee");
        assert_eq!(expense.amount, 15000);
        assert_eq!(expense.merchant, None);
        assert_eq!(expense.created_at, Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap());
    }

    #[test]
    fn name_rules() {
        let mut raw = input();
        raw.name = "   ".to_string();
        let err = validate_expense(Uuid::new_v4(), &raw, now()).unwrap_err();
        assert_eq!(err.field, "name");

        raw.name = "x".repeat(MAX_NAME_CHARS);
        assert!(validate_expense(Uuid::new_v4(), &raw, now()).is_ok());

        raw.name = "x".repeat(MAX_NAME_CHARS + 1);
        assert_eq!(validate_expense(Uuid::new_v4(), &raw, now()).unwrap_err().field, "name");
    }

    #[test]
    fn amount_must_be_a_positive_whole_number() {
        for bad in ["0", "-5", "12.5", "abc", ""] {
            let mut raw = input();
            raw.amount = bad.to_string();
            let err = validate_expense(Uuid::new_v4(), &raw, now()).unwrap_err();
            assert_eq!(err.field, "amount", "input {bad:?}");
        }
    }

    #[test]
    fn amount_is_capped_at_the_json_safe_integer() {
        assert_eq!(parse_amount("9007199254740991"), Ok(MAX_AMOUNT));
        for too_large in ["9007199254740992", "9223372036854775807"] {
            let err = parse_amount(too_large).unwrap_err();
            assert_eq!(err, ValidationError::new("amount", "amount too large"));
        }
    }

    #[test]
    fn nil_id_is_rejected() {
        assert_eq!(validate_expense(Uuid::nil(), &input(), now()).unwrap_err().field, "id");
    }

    #[test]
    fn bare_date_takes_current_time_of_day() {
        let parsed = parse_created_at("2024-03-07", now()).unwrap();
        assert_eq!(parsed.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 7).unwrap());
        assert_eq!(parsed.hour(), 14);
        assert_eq!(parsed.minute(), 30);
        assert!(parse_created_at("07/03/2024", now()).is_err());
    }

    #[test]
    fn payment_is_required() {
        let mut raw = input();
        raw.payment = String::new();
        assert_eq!(validate_expense(Uuid::new_v4(), &raw, now()).unwrap_err().field, "payment");
    }
}
