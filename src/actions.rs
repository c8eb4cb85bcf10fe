//! Mutations over the stored database.
//!
//! Every action loads the full [`LocalDb`] from the given store, applies one
//! change and saves the whole document back. Rejected actions never save.

use chrono::Utc;
use log::{debug, info, warn};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{Store, StoreError};
use crate::models::{Expense, ExpenseInput, Income, ListKind, LocalDb, MonthKey};
use crate::validation::{validate_expense, ValidationError};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0} not found.")]
    NotFound(String),

    #[error("{kind} \"{value}\" already exists.")]
    AlreadyExists { kind: &'static str, value: String },

    #[error("Cannot delete {kind} \"{value}\" that has associated expense.")]
    Conflict { kind: &'static str, value: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Saved,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomeOutcome {
    Created,
    Updated,
    Unchanged,
}

pub fn create_expense<S: Store + ?Sized>(
    store: &S,
    input: &ExpenseInput,
) -> Result<Expense, ActionError> {
    let mut db = store.load()?;
    let id = fresh_id(&db);
    let expense = validate_expense(id, input, Utc::now()).inspect_err(|err| {
        warn!("rejected new expense: {err}");
    })?;

    register_values(&mut db, &expense);
    db.expenses.push(expense.clone());
    store.save(&db)?;

    info!("created expense {} ({})", expense.id, expense.name);
    Ok(expense)
}

pub fn get_expense<S: Store + ?Sized>(store: &S, id: Uuid) -> Result<Expense, ActionError> {
    store
        .load()?
        .expenses
        .into_iter()
        .find(|expense| expense.id == id)
        .ok_or_else(|| expense_not_found(id))
}

/// Re-validate the submitted fields and merge them over the stored record.
///
/// When the submitted calendar date matches the stored one the original
/// timestamp is kept, so editing other fields never moves the time of day.
pub fn edit_expense<S: Store + ?Sized>(
    store: &S,
    id: Uuid,
    input: &ExpenseInput,
) -> Result<Outcome, ActionError> {
    let mut db = store.load()?;
    let position = db
        .expenses
        .iter()
        .position(|expense| expense.id == id)
        .ok_or_else(|| expense_not_found(id))?;

    let stored = &db.expenses[position];
    let mut updated = validate_expense(id, input, Utc::now()).inspect_err(|err| {
        warn!("rejected edit of expense {id}: {err}");
    })?;
    if updated.created_at.date_naive() == stored.created_at.date_naive() {
        updated.created_at = stored.created_at;
    }

    let changed = changed_fields(stored, &updated);
    if changed.is_empty() {
        debug!("expense {id} unchanged, nothing to save");
        return Ok(Outcome::Unchanged);
    }

    register_values(&mut db, &updated);
    db.expenses[position] = updated;
    store.save(&db)?;

    info!("updated expense {id} fields {changed:?}");
    Ok(Outcome::Saved)
}

pub fn delete_expense<S: Store + ?Sized>(store: &S, id: Uuid) -> Result<Expense, ActionError> {
    let mut db = store.load()?;
    let position = db
        .expenses
        .iter()
        .position(|expense| expense.id == id)
        .ok_or_else(|| expense_not_found(id))?;

    let removed = db.expenses.remove(position);
    store.save(&db)?;

    info!("deleted expense {id} ({})", removed.name);
    Ok(removed)
}

pub fn create_list_entry<S: Store + ?Sized>(
    store: &S,
    kind: ListKind,
    value: &str,
) -> Result<(), ActionError> {
    let value = required_value(value)?;
    let mut db = store.load()?;
    let list = db.list_mut(kind);
    if list.iter().any(|item| item == value) {
        return Err(ActionError::AlreadyExists {
            kind: kind.label(),
            value: value.to_string(),
        });
    }

    list.push(value.to_string());
    store.save(&db)?;

    info!("created {} \"{value}\"", kind.label());
    Ok(())
}

/// Replace the entry at `index` with `value`. Existing expenses keep the old value.
pub fn edit_list_entry<S: Store + ?Sized>(
    store: &S,
    kind: ListKind,
    index: usize,
    value: &str,
) -> Result<Outcome, ActionError> {
    let mut db = store.load()?;
    let outcome = apply_list_edit(&mut db, kind, index, value)?;
    if outcome == Outcome::Saved {
        store.save(&db)?;
    }
    Ok(outcome)
}

/// Edit driven by a resubmitted copy of the whole list.
///
/// The submission must differ from the stored list in exactly one position,
/// and that position must be `expected_index` when the caller sent one.
pub fn edit_list_from_submission<S: Store + ?Sized>(
    store: &S,
    kind: ListKind,
    submitted: &[String],
    expected_index: Option<usize>,
) -> Result<Outcome, ActionError> {
    let mut db = store.load()?;
    let (index, value) = diff_list_edit(db.list(kind), submitted)?;
    if expected_index.is_some_and(|expected| expected != index) {
        return Err(ValidationError::new(
            "index",
            format!("submitted list changes position {index}, not the one being edited"),
        )
        .into());
    }
    let outcome = apply_list_edit(&mut db, kind, index, &value)?;
    if outcome == Outcome::Saved {
        store.save(&db)?;
    }
    Ok(outcome)
}

pub fn delete_list_entry<S: Store + ?Sized>(
    store: &S,
    kind: ListKind,
    index: usize,
) -> Result<String, ActionError> {
    let mut db = store.load()?;
    let value = db
        .list(kind)
        .get(index)
        .cloned()
        .ok_or_else(|| list_index_not_found(kind, index))?;

    if db.is_referenced(kind, &value) {
        warn!("refusing to delete {} \"{value}\": still in use", kind.label());
        return Err(ActionError::Conflict {
            kind: kind.label(),
            value,
        });
    }

    db.list_mut(kind).remove(index);
    store.save(&db)?;

    info!("deleted {} \"{value}\"", kind.label());
    Ok(value)
}

pub fn set_income<S: Store + ?Sized>(
    store: &S,
    month: MonthKey,
    amount: i64,
) -> Result<IncomeOutcome, ActionError> {
    let mut db = store.load()?;
    let now = Utc::now();

    let outcome = match db.incomes.iter_mut().find(|income| income.month == month) {
        Some(income) if income.amount == amount => return Ok(IncomeOutcome::Unchanged),
        Some(income) => {
            income.amount = amount;
            income.updated_at = Some(now);
            IncomeOutcome::Updated
        }
        None => {
            db.incomes.push(Income {
                month,
                amount,
                created_at: now,
                updated_at: Some(now),
            });
            IncomeOutcome::Created
        }
    };
    store.save(&db)?;

    info!("income for {month} set to {amount} ({outcome:?})");
    Ok(outcome)
}

/// Locate the single position where `submitted` differs from `stored`.
pub fn diff_list_edit(
    stored: &[String],
    submitted: &[String],
) -> Result<(usize, String), ValidationError> {
    if stored.len() != submitted.len() {
        return Err(ValidationError::new(
            "data",
            "submitted list does not match the stored list",
        ));
    }

    let mut changed = stored
        .iter()
        .zip(submitted)
        .enumerate()
        .filter(|(_, (old, new))| old != new);

    match (changed.next(), changed.next()) {
        (Some((index, (_, new))), None) => Ok((index, new.clone())),
        (None, _) => Err(ValidationError::new("data", "no entry was changed")),
        (Some(_), Some(_)) => Err(ValidationError::new(
            "data",
            "only one entry can be edited at a time",
        )),
    }
}

fn apply_list_edit(
    db: &mut LocalDb,
    kind: ListKind,
    index: usize,
    value: &str,
) -> Result<Outcome, ActionError> {
    let value = required_value(value)?;
    let list = db.list_mut(kind);
    let current = list
        .get(index)
        .ok_or_else(|| list_index_not_found(kind, index))?;
    if current == value {
        return Ok(Outcome::Unchanged);
    }
    if list.iter().any(|item| item == value) {
        return Err(ActionError::AlreadyExists {
            kind: kind.label(),
            value: value.to_string(),
        });
    }

    let previous = std::mem::replace(&mut list[index], value.to_string());
    info!("renamed {} \"{previous}\" to \"{value}\"", kind.label());
    Ok(Outcome::Saved)
}

fn register_values(db: &mut LocalDb, expense: &Expense) {
    register(&mut db.categories, &expense.category);
    if let Some(merchant) = &expense.merchant {
        register(&mut db.merchant, merchant);
    }
    register(&mut db.payment, &expense.payment);
}

fn register(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|item| item == value) {
        list.push(value.to_string());
    }
}

fn changed_fields(stored: &Expense, updated: &Expense) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if stored.name != updated.name {
        changed.push("name");
    }
    if stored.category != updated.category {
        changed.push("category");
    }
    if stored.merchant != updated.merchant {
        changed.push("merchant");
    }
    if stored.created_at != updated.created_at {
        changed.push("createdAt");
    }
    if stored.amount != updated.amount {
        changed.push("amount");
    }
    if stored.payment != updated.payment {
        changed.push("payment");
    }
    if stored.note != updated.note {
        changed.push("note");
    }
    changed
}

fn fresh_id(db: &LocalDb) -> Uuid {
    loop {
        let id = Uuid::new_v4();
        if db.expenses.iter().all(|expense| expense.id != id) {
            return id;
        }
    }
}

fn required_value(value: &str) -> Result<&str, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        Err(ValidationError::new("data", "value cannot be empty"))
    } else {
        Ok(value)
    }
}

fn expense_not_found(id: Uuid) -> ActionError {
    ActionError::NotFound(format!("Expense {id}"))
}

fn list_index_not_found(kind: ListKind, index: usize) -> ActionError {
    ActionError::NotFound(format!("{} at position {index}", kind.label()))
}
