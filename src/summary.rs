use std::collections::BTreeSet;

use crate::models::{Expense, LocalDb, MonthKey, MonthSummary};

/// Totals saturate so an oversized amount from an old blob cannot panic a view.
pub fn subtotal(expenses: &[Expense]) -> i64 {
    expenses
        .iter()
        .map(|expense| expense.amount)
        .fold(0, i64::saturating_add)
}

/// Sum over the whole month, ignoring any category or search filter.
pub fn monthly_expense_total(expenses: &[Expense], month: MonthKey) -> i64 {
    expenses
        .iter()
        .filter(|expense| expense.month() == month)
        .map(|expense| expense.amount)
        .fold(0, i64::saturating_add)
}

pub fn income_for(db: &LocalDb, month: MonthKey) -> i64 {
    db.income_for(month).map(|income| income.amount).unwrap_or(0)
}

pub fn month_summary(db: &LocalDb, month: MonthKey) -> MonthSummary {
    let income = income_for(db, month);
    let expense = monthly_expense_total(&db.expenses, month);
    MonthSummary {
        month,
        label: month.label(),
        income,
        expense,
        remaining: income.saturating_sub(expense),
    }
}

/// Months that have expenses plus the selected one, newest first.
pub fn available_months(expenses: &[Expense], selected: MonthKey) -> Vec<MonthKey> {
    let mut set: BTreeSet<MonthKey> = expenses.iter().map(Expense::month).collect();
    set.insert(selected);
    set.into_iter().rev().collect()
}

pub fn format_amount(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }
    format!("{sign}Rp{grouped}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::tests::{bus, coffee, MemoryStore};
    use crate::actions::{create_expense, set_income};
    use crate::db::Store;

    fn march() -> MonthKey {
        MonthKey::new(2024, 3).unwrap()
    }

    fn coffee_expense() -> Expense {
        let store = MemoryStore::default();
        create_expense(&store, &coffee()).unwrap();
        store.load().unwrap().expenses.remove(0)
    }

    #[test]
    fn remaining_is_income_minus_month_total() {
        let store = MemoryStore::default();
        create_expense(&store, &coffee()).unwrap();
        create_expense(&store, &bus()).unwrap();
        set_income(&store, "March 2024".parse().unwrap(), 500000).unwrap();

        let summary = month_summary(&store.load().unwrap(), march());
        assert_eq!(summary.income, 500000);
        assert_eq!(summary.expense, 20000);
        assert_eq!(summary.remaining, 480000);
        assert_eq!(summary.label, "March 2024");
    }

    #[test]
    fn month_without_income_defaults_to_zero() {
        let store = MemoryStore::default();
        create_expense(&store, &coffee()).unwrap();
        let db = store.load().unwrap();

        let summary = month_summary(&db, march());
        assert_eq!(summary.income, 0);
        assert_eq!(summary.remaining, -15000);

        let empty = month_summary(&db, MonthKey::new(2024, 5).unwrap());
        assert_eq!((empty.income, empty.expense, empty.remaining), (0, 0, 0));
    }

    #[test]
    fn available_months_are_distinct_and_newest_first() {
        let store = MemoryStore::default();
        create_expense(&store, &coffee()).unwrap();
        create_expense(&store, &bus()).unwrap();
        let db = store.load().unwrap();

        let months = available_months(&db.expenses, MonthKey::new(2024, 5).unwrap());
        assert_eq!(
            months,
            vec![MonthKey::new(2024, 5).unwrap(), march()]
        );
    }

    #[test]
    fn oversized_stored_amounts_saturate_instead_of_overflowing() {
        let mut huge = coffee_expense();
        huge.amount = i64::MAX;
        let db = LocalDb {
            expenses: vec![huge.clone(), huge],
            ..LocalDb::default()
        };

        assert_eq!(subtotal(&db.expenses), i64::MAX);
        let summary = month_summary(&db, march());
        assert_eq!(summary.expense, i64::MAX);
        assert_eq!(summary.remaining, -i64::MAX);
    }

    #[test]
    fn amounts_are_grouped_by_thousands() {
        assert_eq!(format_amount(0), "Rp0");
        assert_eq!(format_amount(950), "Rp950");
        assert_eq!(format_amount(15000), "Rp15.000");
        assert_eq!(format_amount(2_480_000), "Rp2.480.000");
        assert_eq!(format_amount(-15000), "-Rp15.000");
    }
}
