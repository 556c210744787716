//! Recurring transaction CRUD endpoints and the endpoint that generates their transactions.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    database_id::{CategoryId, RecurringId},
    recurring::{
        DayOfMonth, RecurringTransaction, RecurringTransactionBuilder,
        create_recurring_transaction, delete_recurring_transaction,
        get_all_recurring_transactions, materialize_all, update_recurring_transaction,
    },
    timezone::local_now,
    transaction::ForeignCurrency,
};

/// The state needed for the recurring transaction endpoints.
#[derive(Debug, Clone)]
pub struct RecurringState {
    pub db_connection: Arc<Mutex<Connection>>,
    /// The canonical timezone used to decide what "today" is.
    pub local_timezone: String,
}

impl FromRef<AppState> for RecurringState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            local_timezone: state.local_timezone.clone(),
        }
    }
}

/// Request body for creating or editing a recurring transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringData {
    pub name: String,
    pub amount: f64,
    pub is_expense: bool,
    pub day_of_month: i64,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub fx: Option<ForeignCurrency>,
}

impl RecurringData {
    fn into_builder(self) -> Result<RecurringTransactionBuilder, Error> {
        let day_of_month = DayOfMonth::new(self.day_of_month)?;

        Ok(
            RecurringTransaction::build(&self.name, self.amount, day_of_month)
                .is_expense(self.is_expense)
                .category_id(self.category_id)
                .fx(self.fx),
        )
    }
}

/// List all recurring transactions.
pub async fn get_recurring_transactions_endpoint(State(state): State<RecurringState>) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_all_recurring_transactions(&connection) {
        Ok(recurring_transactions) => Json(recurring_transactions).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Create a recurring transaction, responding with the new recurring transaction.
pub async fn create_recurring_transaction_endpoint(
    State(state): State<RecurringState>,
    Json(data): Json<RecurringData>,
) -> Response {
    let builder = match data.into_builder() {
        Ok(builder) => builder,
        Err(error) => return error.into_response(),
    };

    let Some(now) = local_now(&state.local_timezone) else {
        return Error::InvalidTimezoneError(state.local_timezone).into_response();
    };

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match create_recurring_transaction(builder, now, &connection) {
        Ok(recurring) => (StatusCode::CREATED, Json(recurring)).into_response(),
        Err(error) => {
            tracing::warn!("could not create recurring transaction: {error}");
            error.into_response()
        }
    }
}

/// Replace the fields of a recurring transaction.
///
/// Transactions that were already generated are left as they are.
pub async fn update_recurring_transaction_endpoint(
    Path(recurring_id): Path<RecurringId>,
    State(state): State<RecurringState>,
    Json(data): Json<RecurringData>,
) -> Response {
    let builder = match data.into_builder() {
        Ok(builder) => builder,
        Err(error) => return error.into_response(),
    };

    let Some(now) = local_now(&state.local_timezone) else {
        return Error::InvalidTimezoneError(state.local_timezone).into_response();
    };

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match update_recurring_transaction(recurring_id, builder, now, &connection) {
        Ok(recurring) => Json(recurring).into_response(),
        Err(error) => {
            tracing::warn!("could not update recurring transaction {recurring_id}: {error}");
            error.into_response()
        }
    }
}

/// Delete a recurring transaction.
///
/// Transactions generated from it are kept and no longer linked to it.
pub async fn delete_recurring_transaction_endpoint(
    Path(recurring_id): Path<RecurringId>,
    State(state): State<RecurringState>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match delete_recurring_transaction(recurring_id, &connection) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error.into_response(),
    }
}

/// Generate the missing transactions for all recurring transactions up to today.
///
/// Responds with the number of transactions created and the IDs of recurring
/// transactions that failed.
pub async fn materialize_endpoint(State(state): State<RecurringState>) -> Response {
    let start_time = std::time::Instant::now();

    let Some(now) = local_now(&state.local_timezone) else {
        return Error::InvalidTimezoneError(state.local_timezone).into_response();
    };

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match materialize_all(now, &connection) {
        Ok(summary) => {
            tracing::info!(
                "Generating recurring transactions completed in {}ms: {} created, {} failed",
                start_time.elapsed().as_millis(),
                summary.created,
                summary.failed.len()
            );

            Json(summary).into_response()
        }
        Err(error) => {
            tracing::error!(
                "Failed to generate recurring transactions after {}ms: {error}",
                start_time.elapsed().as_millis()
            );

            error.into_response()
        }
    }
}
