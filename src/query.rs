use std::cmp::Ordering;

use crate::models::{Expense, MonthKey, SortColumn, SortOption, SortOrder};

#[derive(Clone, Debug)]
pub struct ExpenseQuery {
    pub month: MonthKey,
    pub category: Option<String>,
    pub search: String,
    pub sort: SortOption,
}

impl ExpenseQuery {
    pub fn for_month(month: MonthKey) -> Self {
        Self {
            month,
            category: None,
            search: String::new(),
            sort: SortOption::default(),
        }
    }
}

/// Visible rows for the expense table.
///
/// Stages run in a fixed order: month, category, sort, search. The sort is
/// stable so equal keys keep their stored order.
pub fn derive_visible_expenses(expenses: &[Expense], query: &ExpenseQuery) -> Vec<Expense> {
    let category = query.category.as_deref().filter(|value| !value.is_empty());
    let search = query.search.to_lowercase();

    let mut visible: Vec<Expense> = expenses
        .iter()
        .filter(|expense| expense.month() == query.month)
        .filter(|expense| category.is_none_or(|category| expense.category == category))
        .cloned()
        .collect();

    visible.sort_by(|a, b| {
        let ordering = compare(a, b, query.sort.column);
        match query.sort.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    visible.retain(|expense| {
        search.is_empty()
            || expense.name.to_lowercase().contains(&search)
            || expense.category.to_lowercase().contains(&search)
    });
    visible
}

fn compare(a: &Expense, b: &Expense, column: SortColumn) -> Ordering {
    match column {
        SortColumn::Date => a.created_at.cmp(&b.created_at),
        SortColumn::Name => a.name.cmp(&b.name),
        SortColumn::Category => a.category.cmp(&b.category),
        SortColumn::Merchant => a.merchant.cmp(&b.merchant),
        SortColumn::Payment => a.payment.cmp(&b.payment),
        SortColumn::Amount => a.amount.cmp(&b.amount),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn expense(name: &str, category: &str, amount: i64, day: u32, month: u32) -> Expense {
        Expense {
            id: Uuid::new_v4(),
            name: name.to_string(),
            category: category.to_string(),
            merchant: None,
            created_at: Utc.with_ymd_and_hms(2024, month, day, 8, 0, 0).unwrap(),
            amount,
            payment: "Cash".to_string(),
            note: None,
        }
    }

    fn march() -> MonthKey {
        MonthKey::new(2024, 3).unwrap()
    }

    fn names(expenses: &[Expense]) -> Vec<&str> {
        expenses.iter().map(|expense| expense.name.as_str()).collect()
    }

    fn sample() -> Vec<Expense> {
        vec![
            expense("Coffee", "Food", 15000, 5, 3),
            expense("Bus", "Transport", 5000, 6, 3),
            expense("Rent", "Bills", 2_000_000, 1, 4),
        ]
    }

    #[test]
    fn month_filter_without_other_filters() {
        let visible = derive_visible_expenses(&sample(), &ExpenseQuery::for_month(march()));
        assert_eq!(names(&visible), vec!["Coffee", "Bus"]);
        let subtotal: i64 = visible.iter().map(|expense| expense.amount).sum();
        assert_eq!(subtotal, 20000);
    }

    #[test]
    fn category_filter_is_exact() {
        let mut query = ExpenseQuery::for_month(march());
        query.category = Some("Food".to_string());
        assert_eq!(names(&derive_visible_expenses(&sample(), &query)), vec!["Coffee"]);

        query.category = Some("food".to_string());
        assert!(derive_visible_expenses(&sample(), &query).is_empty());

        query.category = Some(String::new());
        assert_eq!(derive_visible_expenses(&sample(), &query).len(), 2);
    }

    #[test]
    fn search_matches_name_or_category_ignoring_case() {
        let mut query = ExpenseQuery::for_month(march());
        query.search = "TRANS".to_string();
        assert_eq!(names(&derive_visible_expenses(&sample(), &query)), vec!["Bus"]);

        query.search = "cof".to_string();
        assert_eq!(names(&derive_visible_expenses(&sample(), &query)), vec!["Coffee"]);
    }

    #[test]
    fn sorts_by_column_and_order() {
        let mut query = ExpenseQuery::for_month(march());
        query.sort = SortOption {
            column: SortColumn::Amount,
            order: SortOrder::Asc,
        };
        assert_eq!(names(&derive_visible_expenses(&sample(), &query)), vec!["Bus", "Coffee"]);

        query.sort.order = SortOrder::Desc;
        assert_eq!(names(&derive_visible_expenses(&sample(), &query)), vec!["Coffee", "Bus"]);

        query.sort = SortOption {
            column: SortColumn::Date,
            order: SortOrder::Desc,
        };
        assert_eq!(names(&derive_visible_expenses(&sample(), &query)), vec!["Bus", "Coffee"]);
    }

    #[test]
    fn equal_keys_keep_stored_order() {
        let expenses = vec![
            expense("Lunch", "Food", 20000, 2, 3),
            expense("Snack", "Food", 20000, 9, 3),
            expense("Dinner", "Food", 20000, 4, 3),
        ];
        let mut query = ExpenseQuery::for_month(march());
        query.sort.column = SortColumn::Amount;
        assert_eq!(
            names(&derive_visible_expenses(&expenses, &query)),
            vec!["Lunch", "Snack", "Dinner"]
        );
        query.sort.column = SortColumn::Category;
        query.sort.order = SortOrder::Desc;
        assert_eq!(
            names(&derive_visible_expenses(&expenses, &query)),
            vec!["Lunch", "Snack", "Dinner"]
        );
    }

    #[test]
    fn pipeline_is_repeatable() {
        let mut query = ExpenseQuery::for_month(march());
        query.search = "o".to_string();
        query.sort.order = SortOrder::Desc;
        let expenses = sample();
        assert_eq!(
            derive_visible_expenses(&expenses, &query),
            derive_visible_expenses(&expenses, &query)
        );
    }
}
