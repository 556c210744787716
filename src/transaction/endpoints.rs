//! Transaction list, manual entry, edit and delete endpoints.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    AppState, Error,
    database_id::{CategoryId, RecurringId, TransactionId},
    transaction::{
        ForeignCurrency, Transaction, TransactionBuilder, create_transaction, delete_transaction,
        get_all_transactions, update_transaction,
    },
};

/// The state needed for the transaction endpoints.
#[derive(Debug, Clone)]
pub struct TransactionState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for TransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Request body for manually entering a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionData {
    pub name: String,
    pub amount: f64,
    pub is_expense: bool,
    pub date: Date,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub fx: Option<ForeignCurrency>,
    /// Entering a transaction for a recurring transaction stops a second one
    /// being generated for the same month.
    #[serde(default)]
    pub recurring_id: Option<RecurringId>,
}

impl TransactionData {
    fn into_builder(self) -> TransactionBuilder {
        Transaction::build(&self.name, self.amount, self.date)
            .is_expense(self.is_expense)
            .category_id(self.category_id)
            .fx(self.fx)
            .recurring_id(self.recurring_id)
    }
}

/// List all transactions, newest first.
pub async fn get_transactions_endpoint(State(state): State<TransactionState>) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match get_all_transactions(&connection) {
        Ok(transactions) => Json(transactions).into_response(),
        Err(error) => error.into_response(),
    }
}

/// Create a transaction, responding with the new transaction.
pub async fn create_transaction_endpoint(
    State(state): State<TransactionState>,
    Json(data): Json<TransactionData>,
) -> Response {
    let builder = data.into_builder();

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match create_transaction(builder, &connection) {
        Ok(transaction) => (StatusCode::CREATED, Json(transaction)).into_response(),
        Err(error) => {
            tracing::warn!("could not create transaction: {error}");
            error.into_response()
        }
    }
}

/// Replace the fields of a transaction, responding with the updated transaction.
///
/// Moving a transaction of a recurring transaction into a month that already
/// has one is rejected with 409 Conflict.
pub async fn update_transaction_endpoint(
    Path(transaction_id): Path<TransactionId>,
    State(state): State<TransactionState>,
    Json(data): Json<TransactionData>,
) -> Response {
    let builder = data.into_builder();

    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match update_transaction(transaction_id, builder, &connection) {
        Ok(transaction) => Json(transaction).into_response(),
        Err(error) => {
            tracing::warn!("could not update transaction {transaction_id}: {error}");
            error.into_response()
        }
    }
}

/// Delete a transaction.
///
/// Deleting a generated transaction does not bring it back: the month stays
/// covered by its recurring transaction's checkpoint.
pub async fn delete_transaction_endpoint(
    Path(transaction_id): Path<TransactionId>,
    State(state): State<TransactionState>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_response();
        }
    };

    match delete_transaction(transaction_id, &connection) {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error.into_response(),
    }
}
