//! Defines the core data models and database queries for transactions.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{
    Error,
    database_id::{CategoryId, RecurringId, TransactionId},
};

// ============================================================================
// MODELS
// ============================================================================

/// The exchange details for an amount recorded in a foreign currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignCurrency {
    /// How many units of the local currency one unit of the foreign currency is worth.
    pub rate: f64,
    /// The currency symbol or code, e.g. "USD".
    pub symbol: Option<String>,
}

/// An expense or income, i.e. an event where money was either spent or earned.
///
/// Transactions generated from a [RecurringTransaction](crate::recurring::RecurringTransaction)
/// are snapshots: they copy the template's fields when they are created, and
/// later edits to the template do not change them.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// A text description of what the transaction was for.
    pub name: String,
    /// The amount of money spent or earned, always greater than zero.
    pub amount: f64,
    /// Whether money was spent (`true`) or earned (`false`).
    pub is_expense: bool,
    /// When the transaction happened.
    pub date: Date,
    /// The ID of the category the transaction belongs to.
    pub category_id: Option<CategoryId>,
    /// Set when the amount is in a foreign currency.
    pub fx: Option<ForeignCurrency>,
    /// The recurring transaction this transaction was generated from, or
    /// entered for.
    pub recurring_id: Option<RecurringId>,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(name: &str, amount: f64, date: Date) -> TransactionBuilder {
        TransactionBuilder {
            name: name.to_owned(),
            amount,
            is_expense: true,
            date,
            category_id: None,
            fx: None,
            recurring_id: None,
        }
    }
}

/// A builder for creating [Transaction] instances.
///
/// Optional fields default to an uncategorised expense in the local currency
/// that does not belong to a recurring transaction.
#[derive(Debug, PartialEq, Clone)]
pub struct TransactionBuilder {
    /// A human-readable description of the transaction.
    pub name: String,

    /// The monetary amount of the transaction.
    ///
    /// Must be greater than zero, the direction of the money is given by
    /// `is_expense`.
    pub amount: f64,

    /// Whether the transaction is an expense or income.
    pub is_expense: bool,

    /// The date when the transaction occurred.
    pub date: Date,

    /// The category of the transaction, e.g. "Groceries", "Rent".
    pub category_id: Option<CategoryId>,

    /// The exchange details if the amount is in a foreign currency.
    pub fx: Option<ForeignCurrency>,

    /// The recurring transaction this transaction belongs to.
    ///
    /// The database allows at most one transaction per recurring transaction
    /// per calendar month.
    pub recurring_id: Option<RecurringId>,
}

impl TransactionBuilder {
    /// Set whether the transaction is an expense or income.
    pub fn is_expense(mut self, is_expense: bool) -> Self {
        self.is_expense = is_expense;
        self
    }

    /// Set the category id for the transaction.
    pub fn category_id(mut self, category_id: Option<CategoryId>) -> Self {
        self.category_id = category_id;
        self
    }

    /// Set the foreign currency details for the transaction.
    pub fn fx(mut self, fx: Option<ForeignCurrency>) -> Self {
        self.fx = fx;
        self
    }

    /// Set the recurring transaction the transaction belongs to.
    pub fn recurring_id(mut self, recurring_id: Option<RecurringId>) -> Self {
        self.recurring_id = recurring_id;
        self
    }
}

/// Check the fields shared by transactions and recurring transactions.
///
/// # Errors
/// This function will return a:
/// - [Error::EmptyName] if `name` is empty or just whitespace,
/// - [Error::InvalidAmount] if `amount` is not a finite number greater than zero,
/// - or [Error::InvalidFxRate] if the exchange rate is not a finite number greater than zero.
pub fn validate_financial_fields(
    name: &str,
    amount: f64,
    fx: Option<&ForeignCurrency>,
) -> Result<(), Error> {
    if name.trim().is_empty() {
        return Err(Error::EmptyName);
    }

    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidAmount(amount));
    }

    match fx {
        Some(fx) if !fx.rate.is_finite() || fx.rate <= 0.0 => Err(Error::InvalidFxRate(fx.rate)),
        _ => Ok(()),
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create a new transaction in the database from a builder.
///
/// # Errors
/// This function will return a:
/// - validation error from [validate_financial_fields],
/// - [Error::InvalidRecurring] if the recurring transaction ID does not refer to a recurring transaction,
/// - [Error::InvalidCategory] if the category ID does not refer to a category,
/// - [Error::DuplicateRecurringMonth] if the recurring transaction already has a transaction in the same month,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    validate_financial_fields(&builder.name, builder.amount, builder.fx.as_ref())?;

    let (fx_rate, fx_symbol) = match &builder.fx {
        Some(fx) => (Some(fx.rate), fx.symbol.clone()),
        None => (None, None),
    };

    let transaction = connection
        .prepare(
            "INSERT INTO \"transaction\"
                (name, amount, is_expense, date, category_id, is_fx, fx_rate, fx_symbol, recurring_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             RETURNING id, name, amount, is_expense, date, category_id, is_fx, fx_rate, fx_symbol, recurring_id",
        )?
        .query_row(
            (
                builder.name.trim(),
                builder.amount,
                builder.is_expense,
                builder.date,
                builder.category_id,
                builder.fx.is_some(),
                fx_rate,
                fx_symbol,
                builder.recurring_id,
            ),
            map_transaction_row,
        )
        .map_err(|error| map_write_error(error, &builder, connection))?;

    Ok(transaction)
}

/// Update the transaction `id` with the fields in `builder`.
///
/// # Errors
/// This function will return a:
/// - validation error from [validate_financial_fields],
/// - [Error::UpdateMissingTransaction] if `id` does not refer to a transaction,
/// - [Error::InvalidRecurring] if the recurring transaction ID does not refer to a recurring transaction,
/// - [Error::InvalidCategory] if the category ID does not refer to a category,
/// - [Error::DuplicateRecurringMonth] if the update would give the recurring transaction a second transaction in a month,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_transaction(
    id: TransactionId,
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    validate_financial_fields(&builder.name, builder.amount, builder.fx.as_ref())?;

    let (fx_rate, fx_symbol) = match &builder.fx {
        Some(fx) => (Some(fx.rate), fx.symbol.clone()),
        None => (None, None),
    };

    connection
        .prepare(
            "UPDATE \"transaction\"
             SET name = ?1, amount = ?2, is_expense = ?3, date = ?4, category_id = ?5,
                 is_fx = ?6, fx_rate = ?7, fx_symbol = ?8, recurring_id = ?9
             WHERE id = ?10
             RETURNING id, name, amount, is_expense, date, category_id, is_fx, fx_rate, fx_symbol, recurring_id",
        )?
        .query_row(
            (
                builder.name.trim(),
                builder.amount,
                builder.is_expense,
                builder.date,
                builder.category_id,
                builder.fx.is_some(),
                fx_rate,
                fx_symbol,
                builder.recurring_id,
                id,
            ),
            map_transaction_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::UpdateMissingTransaction,
            error => map_write_error(error, &builder, connection),
        })
}

/// Delete a transaction by ID.
///
/// # Errors
/// Returns [Error::DeleteMissingTransaction] if the transaction doesn't exist.
pub fn delete_transaction(id: TransactionId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute("DELETE FROM \"transaction\" WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingTransaction);
    }

    Ok(())
}

/// Map a constraint violation from writing `builder` to the matching error.
fn map_write_error(
    error: rusqlite::Error,
    builder: &TransactionBuilder,
    connection: &Connection,
) -> Error {
    match error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: _,
                extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
            },
            _,
        ) => invalid_reference_error(builder, connection),
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: _,
                extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
            },
            _,
        ) => Error::DuplicateRecurringMonth(builder.date),
        error => error.into(),
    }
}

/// Work out which foreign key caused a write to fail.
///
/// Returns [Error::SqlError] if the recurring transaction table cannot be read.
fn invalid_reference_error(builder: &TransactionBuilder, connection: &Connection) -> Error {
    let recurring_exists = match builder.recurring_id {
        Some(recurring_id) => connection.query_row(
            "SELECT EXISTS(SELECT 1 FROM recurring_transaction WHERE id = ?1)",
            [recurring_id],
            |row| row.get(0),
        ),
        None => Ok(true),
    };

    match recurring_exists {
        Ok(true) => Error::InvalidCategory(builder.category_id),
        Ok(false) => Error::InvalidRecurring(builder.recurring_id),
        Err(error) => error.into(),
    }
}

/// Retrieve a transaction from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_transaction(id: TransactionId, connection: &Connection) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(
            "SELECT id, name, amount, is_expense, date, category_id, is_fx, fx_rate, fx_symbol, recurring_id
             FROM \"transaction\" WHERE id = :id",
        )?
        .query_one(&[(":id", &id)], map_transaction_row)?;

    Ok(transaction)
}

/// Retrieve all transactions, newest first.
pub fn get_all_transactions(connection: &Connection) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT id, name, amount, is_expense, date, category_id, is_fx, fx_rate, fx_symbol, recurring_id
             FROM \"transaction\" ORDER BY date DESC, id DESC",
        )?
        .query_map([], map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
        .collect()
}

/// Retrieve the dates of every transaction that belongs to a recurring transaction.
///
/// The dates are sorted in ascending order.
pub fn get_transaction_dates_for_recurring(
    recurring_id: RecurringId,
    connection: &Connection,
) -> Result<Vec<Date>, Error> {
    connection
        .prepare(
            "SELECT date FROM \"transaction\" WHERE recurring_id = :recurring_id ORDER BY date ASC",
        )?
        .query_map(&[(":recurring_id", &recurring_id)], |row| row.get(0))?
        .map(|maybe_date| maybe_date.map_err(Error::from))
        .collect()
}

/// Get the total number of transactions in the database.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
pub fn count_transactions(connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM \"transaction\";", [], |row| {
            row.get(0)
        })
        .map_err(|error| error.into())
}

/// Create the transaction table in the database.
///
/// The category and recurring transaction tables must be created first.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                amount REAL NOT NULL,
                is_expense INTEGER NOT NULL,
                date TEXT NOT NULL,
                category_id INTEGER,
                is_fx INTEGER NOT NULL DEFAULT 0,
                fx_rate REAL,
                fx_symbol TEXT,
                recurring_id INTEGER,
                FOREIGN KEY(category_id) REFERENCES category(id) ON UPDATE CASCADE ON DELETE SET NULL,
                FOREIGN KEY(recurring_id) REFERENCES recurring_transaction(id) ON UPDATE CASCADE ON DELETE SET NULL
                )",
        (),
    )?;

    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transaction_date ON \"transaction\"(date);",
        (),
    )?;

    // At most one transaction per recurring transaction per calendar month.
    // Dates are stored as YYYY-MM-DD so the first seven characters are the month.
    connection.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_transaction_recurring_month
            ON \"transaction\"(recurring_id, substr(date, 1, 7))
            WHERE recurring_id IS NOT NULL;",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let id = row.get(0)?;
    let name = row.get(1)?;
    let amount = row.get(2)?;
    let is_expense = row.get(3)?;
    let date = row.get(4)?;
    let category_id = row.get(5)?;
    let is_fx: bool = row.get(6)?;
    let fx_rate: Option<f64> = row.get(7)?;
    let fx_symbol: Option<String> = row.get(8)?;
    let recurring_id = row.get(9)?;

    let fx = match (is_fx, fx_rate) {
        (true, Some(rate)) => Some(ForeignCurrency {
            rate,
            symbol: fx_symbol,
        }),
        _ => None,
    };

    Ok(Transaction {
        id,
        name,
        amount,
        is_expense,
        date,
        category_id,
        fx,
        recurring_id,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod validation_tests {
    use crate::{Error, transaction::ForeignCurrency};

    use super::validate_financial_fields;

    #[test]
    fn rejects_blank_name() {
        assert_eq!(
            validate_financial_fields("  ", 1.0, None),
            Err(Error::EmptyName)
        );
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert_eq!(
            validate_financial_fields("Rent", 0.0, None),
            Err(Error::InvalidAmount(0.0))
        );
        assert_eq!(
            validate_financial_fields("Rent", -10.0, None),
            Err(Error::InvalidAmount(-10.0))
        );
        assert!(validate_financial_fields("Rent", f64::NAN, None).is_err());
    }

    #[test]
    fn rejects_invalid_fx_rate() {
        let fx = ForeignCurrency {
            rate: 0.0,
            symbol: Some("USD".to_owned()),
        };

        assert_eq!(
            validate_financial_fields("Rent", 10.0, Some(&fx)),
            Err(Error::InvalidFxRate(0.0))
        );
    }

    #[test]
    fn accepts_valid_fields() {
        let fx = ForeignCurrency {
            rate: 1.6,
            symbol: None,
        };

        assert_eq!(validate_financial_fields("Rent", 10.0, Some(&fx)), Ok(()));
    }
}
