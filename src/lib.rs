//! Budgetor is a personal finance tracker for recording income and expenses.
//!
//! This library provides a JSON API for categories, transactions and recurring
//! transactions, plus the engine that turns recurring transaction templates into
//! concrete, dated transactions.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use time::Date;
use tokio::signal;

mod app_state;
mod category;
mod database_id;
mod db;
pub mod endpoints;
mod logging;
mod recurring;
mod routing;
mod timezone;
mod transaction;

pub use app_state::AppState;
pub use category::{
    Category, CategoryName, create_category, delete_category, get_all_categories, get_category,
    update_category,
};
pub use database_id::{CategoryId, DatabaseId, RecurringId, TransactionId};
pub use db::initialize as initialize_db;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use recurring::{
    DayOfMonth, MaterializeSummary, MonthlySchedule, OccurrencePlan, RecurringTransaction,
    RecurringTransactionBuilder, create_recurring_transaction, delete_recurring_transaction,
    first_candidate, get_all_recurring_transactions, get_recurring_transaction, materialize_all,
    next_tick, plan_occurrences, update_recurring_transaction,
};
pub use routing::build_router;
pub use timezone::{get_local_offset, local_now};
pub use transaction::{
    ForeignCurrency, Transaction, TransactionBuilder, create_transaction, delete_transaction,
    get_all_transactions, update_transaction,
};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(error) => {
                tracing::error!("failed to install signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The requested resource was not found.
    ///
    /// For HTTP request handlers, the client should check that the parameters
    /// (e.g., ID) are correct and that the resource has been created.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An error occurred while getting the local timezone from a canonical timezone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// An empty string was used for a name.
    #[error("name cannot be empty")]
    EmptyName,

    /// A transaction amount must be a finite number greater than zero.
    ///
    /// Whether money was spent or earned is recorded separately with the
    /// `is_expense` flag.
    #[error("{0} is not a valid amount, amounts must be greater than zero")]
    InvalidAmount(f64),

    /// A day of the month outside of 1 to 31 (inclusive).
    #[error("{0} is not a valid day of the month, expected a number from 1 to 31")]
    InvalidDayOfMonth(i64),

    /// A foreign exchange rate must be a finite number greater than zero.
    #[error("{0} is not a valid exchange rate")]
    InvalidFxRate(f64),

    /// The category ID did not match a valid category.
    #[error("the category ID does not refer to a valid category")]
    InvalidCategory(Option<CategoryId>),

    /// The recurring transaction ID did not match a valid recurring transaction.
    #[error("the recurring transaction ID does not refer to a valid recurring transaction")]
    InvalidRecurring(Option<RecurringId>),

    /// The specified category name already exists in the database.
    #[error("the category \"{0}\" already exists in the database")]
    DuplicateCategoryName(String),

    /// A recurring transaction already has a transaction in the same calendar month.
    ///
    /// Each recurring transaction may have at most one transaction per month.
    #[error("the recurring transaction already has a transaction in the month of {0}")]
    DuplicateRecurringMonth(Date),

    /// Tried to update a recurring transaction that does not exist
    #[error("tried to update a recurring transaction that is not in the database")]
    UpdateMissingRecurring,

    /// Tried to delete a recurring transaction that does not exist
    #[error("tried to delete a recurring transaction that is not in the database")]
    DeleteMissingRecurring,

    /// Tried to update a transaction that does not exist
    #[error("tried to update a transaction that is not in the database")]
    UpdateMissingTransaction,

    /// Tried to delete a transaction that does not exist
    #[error("tried to delete a transaction that is not in the database")]
    DeleteMissingTransaction,

    /// Tried to update a category that does not exist
    #[error("tried to update a category that is not in the database")]
    UpdateMissingCategory,

    /// Tried to delete a category that does not exist
    #[error("tried to delete a category that is not in the database")]
    DeleteMissingCategory,
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound | Error::UpdateMissingRecurring | Error::DeleteMissingRecurring => {
                StatusCode::NOT_FOUND
            }
            Error::UpdateMissingTransaction
            | Error::DeleteMissingTransaction
            | Error::UpdateMissingCategory
            | Error::DeleteMissingCategory => StatusCode::NOT_FOUND,
            Error::EmptyName
            | Error::InvalidAmount(_)
            | Error::InvalidDayOfMonth(_)
            | Error::InvalidFxRate(_)
            | Error::InvalidCategory(_)
            | Error::InvalidRecurring(_) => StatusCode::BAD_REQUEST,
            Error::DuplicateCategoryName(_) | Error::DuplicateRecurringMonth(_) => {
                StatusCode::CONFLICT
            }
            Error::SqlError(_) | Error::DatabaseLockError | Error::InvalidTimezoneError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match self {
            Error::InvalidTimezoneError(timezone) => format!(
                "Could not get local timezone \"{timezone}\". Check your server settings and \
                ensure the timezone has been set to valid, canonical timezone string"
            ),
            // Internal errors are not intended to be shown to the client.
            error if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!("An unexpected error occurred: {}", error);
                "An unexpected error occurred, check the server logs for more details.".to_owned()
            }
            error => error.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
