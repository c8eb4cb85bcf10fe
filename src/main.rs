#[macro_use]
extern crate rocket;

mod actions;
mod db;
mod models;
mod query;
mod summary;
mod validation;

use std::path::PathBuf;
use std::str::FromStr;

use actions::{ActionError, IncomeOutcome, Outcome};
use chrono::{DateTime, Local, Utc};
use db::{SqliteStore, Store};
use log::{error, info};
use models::{
    Expense, ExpenseInput, ListKind, LocalDb, MonthKey, MonthSummary, SortColumn, SortOption,
    SortOrder,
};
use query::ExpenseQuery;
use rocket::fairing::{self, AdHoc};
use rocket::form::Form;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::response::{self, Redirect, Responder};
use rocket::serde::json::Json;
use rocket::{Build, Request, Rocket, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validation::ValidationError;

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AppConfig {
    data_dir: PathBuf,
    database_file: String,
    storage_key: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database_file: "expense-tracker.sqlite".to_string(),
            storage_key: "expense-seed".to_string(),
        }
    }
}

#[derive(FromForm)]
struct ExpenseForm {
    name: Option<String>,
    category: Option<String>,
    merchant: Option<String>,
    #[field(name = "createdAt")]
    created_at: Option<String>,
    amount: Option<String>,
    payment: Option<String>,
    note: Option<String>,
    action: Option<String>,
    callback: Option<String>,
}

impl ExpenseForm {
    fn to_input(&self) -> ExpenseInput {
        ExpenseInput {
            name: self.name.clone().unwrap_or_default(),
            category: self.category.clone().unwrap_or_default(),
            merchant: self.merchant.clone(),
            created_at: self.created_at.clone().unwrap_or_default(),
            amount: self.amount.clone().unwrap_or_default(),
            payment: self.payment.clone().unwrap_or_default(),
            note: self.note.clone(),
        }
    }
}

#[derive(FromForm)]
struct SettingsForm {
    action: Option<String>,
    data: Option<String>,
    index: Option<usize>,
    callback: Option<String>,
}

#[derive(FromForm)]
struct IncomeForm {
    month: Option<String>,
    amount: Option<String>,
    callback: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpenseAction {
    Save,
    Delete,
}

impl FromStr for ExpenseAction {
    type Err = ();

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "save" => Ok(ExpenseAction::Save),
            "delete" => Ok(ExpenseAction::Delete),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingsAction {
    Create(ListKind),
    Edit(ListKind),
    Delete(ListKind),
}

impl FromStr for SettingsAction {
    type Err = ();

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (verb, target) = input.split_once('_').ok_or(())?;
        let kind = match target {
            "category" => ListKind::Category,
            "merchant" => ListKind::Merchant,
            "payment" => ListKind::Payment,
            _ => return Err(()),
        };
        match verb {
            "create" => Ok(SettingsAction::Create(kind)),
            "edit" => Ok(SettingsAction::Edit(kind)),
            "delete" => Ok(SettingsAction::Delete(kind)),
            _ => Err(()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
enum ApiError {
    Action(ActionError),
    BadRequest(String),
    UnknownAction(String),
}

impl From<ActionError> for ApiError {
    fn from(err: ActionError) -> Self {
        ApiError::Action(err)
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Action(err.into())
    }
}

impl From<db::StoreError> for ApiError {
    fn from(err: db::StoreError) -> Self {
        ApiError::Action(err.into())
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let (status, message) = match self {
            ApiError::Action(err) => {
                let status = match &err {
                    ActionError::Validation(_) => Status::UnprocessableEntity,
                    ActionError::NotFound(_) => Status::NotFound,
                    ActionError::AlreadyExists { .. } | ActionError::Conflict { .. } => {
                        Status::Conflict
                    }
                    ActionError::Store(store_err) => {
                        error!("storage failure: {store_err}");
                        Status::InternalServerError
                    }
                };
                (status, err.to_string())
            }
            ApiError::BadRequest(message) => (Status::BadRequest, message),
            ApiError::UnknownAction(verb) => {
                error!("Action not recognized: {verb:?}");
                return Err(Status::InternalServerError);
            }
        };
        Custom(status, Json(ErrorBody { error: message })).respond_to(request)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpenseView {
    id: Uuid,
    name: String,
    category: String,
    merchant: Option<String>,
    created_at: DateTime<Utc>,
    date: String,
    amount: i64,
    formatted_amount: String,
    payment: String,
    note: Option<String>,
}

#[derive(Serialize)]
struct MonthOption {
    value: MonthKey,
    label: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExpenseTable {
    month: MonthKey,
    label: String,
    months: Vec<MonthOption>,
    count: usize,
    subtotal: i64,
    formatted_subtotal: String,
    expenses: Vec<ExpenseView>,
    summary: MonthSummary,
}

fn expense_view(expense: Expense) -> ExpenseView {
    ExpenseView {
        id: expense.id,
        date: expense.created_at.date_naive().format("%Y-%m-%d").to_string(),
        formatted_amount: summary::format_amount(expense.amount),
        name: expense.name,
        category: expense.category,
        merchant: expense.merchant,
        created_at: expense.created_at,
        amount: expense.amount,
        payment: expense.payment,
        note: expense.note,
    }
}

fn current_month() -> MonthKey {
    MonthKey::of(&Local::now().date_naive())
}

fn selected_month(month: Option<&str>) -> Result<MonthKey, ApiError> {
    match month.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value
            .parse()
            .map_err(|err: models::ParseMonthError| ApiError::BadRequest(err.to_string())),
        None => Ok(current_month()),
    }
}

fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::BadRequest(format!("\"{id}\" is not a valid id")))
}

/// Only same-site absolute paths are followed after a successful action.
fn callback_target(callback: Option<&str>) -> String {
    match callback {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path.to_string(),
        _ => "/".to_string(),
    }
}

#[get("/api/db")]
fn database(store: &State<SqliteStore>) -> Result<Json<LocalDb>, ApiError> {
    Ok(Json(store.load()?))
}

#[get("/expenses?<month>&<category>&<search>&<sort>&<order>")]
fn expenses(
    store: &State<SqliteStore>,
    month: Option<&str>,
    category: Option<String>,
    search: Option<String>,
    sort: Option<&str>,
    order: Option<&str>,
) -> Result<Json<ExpenseTable>, ApiError> {
    let selected = selected_month(month)?;
    let sort = SortOption {
        column: SortColumn::from_str(sort.unwrap_or_default()).map_err(ApiError::BadRequest)?,
        order: SortOrder::from_str(order.unwrap_or_default()).map_err(ApiError::BadRequest)?,
    };
    let query = ExpenseQuery {
        category,
        search: search.unwrap_or_default(),
        sort,
        ..ExpenseQuery::for_month(selected)
    };

    let db = store.load()?;
    let visible = query::derive_visible_expenses(&db.expenses, &query);
    let subtotal = summary::subtotal(&visible);
    let months = summary::available_months(&db.expenses, selected)
        .into_iter()
        .map(|value| MonthOption {
            value,
            label: value.label(),
        })
        .collect();

    Ok(Json(ExpenseTable {
        month: selected,
        label: selected.label(),
        months,
        count: visible.len(),
        subtotal,
        formatted_subtotal: summary::format_amount(subtotal),
        summary: summary::month_summary(&db, selected),
        expenses: visible.into_iter().map(expense_view).collect(),
    }))
}

#[get("/expenses/<id>")]
fn expense_detail(store: &State<SqliteStore>, id: &str) -> Result<Json<ExpenseView>, ApiError> {
    let expense = actions::get_expense(store.inner(), parse_id(id)?)?;
    Ok(Json(expense_view(expense)))
}

#[post("/expenses", data = "<form>")]
fn create_expense(
    store: &State<SqliteStore>,
    form: Form<ExpenseForm>,
) -> Result<Redirect, ApiError> {
    match form.action.as_deref() {
        None | Some("") | Some("create") => {}
        Some(other) => return Err(ApiError::UnknownAction(other.to_string())),
    }
    actions::create_expense(store.inner(), &form.to_input())?;
    Ok(Redirect::to(callback_target(form.callback.as_deref())))
}

#[post("/expenses/<id>", data = "<form>")]
fn update_expense(
    store: &State<SqliteStore>,
    id: &str,
    form: Form<ExpenseForm>,
) -> Result<Redirect, ApiError> {
    let verb = form.action.clone().unwrap_or_default();
    let action = ExpenseAction::from_str(&verb).map_err(|_| ApiError::UnknownAction(verb))?;
    let id = parse_id(id)?;

    match action {
        ExpenseAction::Save => {
            if actions::edit_expense(store.inner(), id, &form.to_input())? == Outcome::Unchanged {
                info!("expense {id} submitted without changes");
            }
        }
        ExpenseAction::Delete => {
            actions::delete_expense(store.inner(), id)?;
        }
    }
    Ok(Redirect::to(callback_target(form.callback.as_deref())))
}

#[post("/settings", data = "<form>")]
fn settings(store: &State<SqliteStore>, form: Form<SettingsForm>) -> Result<Redirect, ApiError> {
    let verb = form.action.clone().unwrap_or_default();
    let action = SettingsAction::from_str(&verb).map_err(|_| ApiError::UnknownAction(verb))?;
    let data = form.data.as_deref().unwrap_or_default();

    match action {
        SettingsAction::Create(kind) => actions::create_list_entry(store.inner(), kind, data)?,
        SettingsAction::Edit(kind) => {
            // Older clients resubmit the whole list as JSON, with or without `index`.
            match (serde_json::from_str::<Vec<String>>(data), form.index) {
                (Ok(submitted), index) => {
                    actions::edit_list_from_submission(store.inner(), kind, &submitted, index)?
                }
                (Err(_), Some(index)) => actions::edit_list_entry(store.inner(), kind, index, data)?,
                (Err(_), None) => {
                    return Err(ValidationError::new(
                        "data",
                        "expected the edited list as a JSON array",
                    )
                    .into());
                }
            };
        }
        SettingsAction::Delete(kind) => {
            let index = form
                .index
                .ok_or_else(|| ValidationError::new("index", "position to delete is required"))?;
            actions::delete_list_entry(store.inner(), kind, index)?;
        }
    }
    Ok(Redirect::to(callback_target(form.callback.as_deref())))
}

#[get("/summary?<month>")]
fn month_summary(
    store: &State<SqliteStore>,
    month: Option<&str>,
) -> Result<Json<MonthSummary>, ApiError> {
    let selected = selected_month(month)?;
    let db = store.load()?;
    Ok(Json(summary::month_summary(&db, selected)))
}

#[post("/incomes", data = "<form>")]
fn set_income(store: &State<SqliteStore>, form: Form<IncomeForm>) -> Result<Redirect, ApiError> {
    let month = selected_month(form.month.as_deref())?;
    let amount: i64 = form
        .amount
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .parse()
        .map_err(|_| ValidationError::new("amount", "must be a whole number"))?;

    if actions::set_income(store.inner(), month, amount)? == IncomeOutcome::Unchanged {
        info!("income for {month} already {amount}");
    }
    Ok(Redirect::to(callback_target(form.callback.as_deref())))
}

async fn open_store(rocket: Rocket<Build>) -> fairing::Result {
    let config: AppConfig = match rocket.figment().extract() {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {err}");
            return Err(rocket);
        }
    };
    if let Err(err) = std::fs::create_dir_all(&config.data_dir) {
        error!("cannot create {}: {err}", config.data_dir.display());
        return Err(rocket);
    }

    let path = config.data_dir.join(&config.database_file);
    match SqliteStore::open(&path, config.storage_key) {
        Ok(store) => {
            info!("local store at {} under key \"{}\"", path.display(), store.key());
            Ok(rocket.manage(store))
        }
        Err(err) => {
            error!("cannot open {}: {err}", path.display());
            Err(rocket)
        }
    }
}

fn app(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .attach(AdHoc::try_on_ignite("Local store", open_store))
        .mount(
            "/",
            routes![
                database,
                expenses,
                expense_detail,
                create_expense,
                update_expense,
                settings,
                month_summary,
                set_income
            ],
        )
}

#[launch]
fn rocket() -> _ {
    app(rocket::build())
}
