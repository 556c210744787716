//! Defines the recurring transaction model and its database queries.

use rusqlite::{Connection, Row, types::Type};
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};

use crate::{
    Error,
    database_id::{CategoryId, RecurringId},
    recurring::{DayOfMonth, MonthlySchedule},
    transaction::{ForeignCurrency, Transaction, TransactionBuilder, validate_financial_fields},
};

// ============================================================================
// MODELS
// ============================================================================

/// A template for an expense or income that happens once a month, e.g. rent
/// paid on the 31st of every month.
///
/// Transactions are generated from the template by
/// [materialize_all](crate::recurring::materialize_all).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringTransaction {
    /// The ID of the recurring transaction.
    pub id: RecurringId,
    /// The name copied to each generated transaction.
    pub name: String,
    /// The amount copied to each generated transaction, always greater than zero.
    pub amount: f64,
    /// Whether the generated transactions are expenses or income.
    pub is_expense: bool,
    /// The day of the month the transaction happens on.
    pub day_of_month: DayOfMonth,
    /// The category copied to each generated transaction.
    pub category_id: Option<CategoryId>,
    /// The foreign currency details copied to each generated transaction.
    pub fx: Option<ForeignCurrency>,
    /// When the recurring transaction was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the recurring transaction was last edited.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// The last scheduled date that transactions have been generated up to.
    ///
    /// Only changed by materialization, never by edits.
    pub last_materialized_through: Option<Date>,
}

impl RecurringTransaction {
    /// Create a new recurring transaction.
    ///
    /// Shortcut for [RecurringTransactionBuilder] for discoverability.
    pub fn build(name: &str, amount: f64, day_of_month: DayOfMonth) -> RecurringTransactionBuilder {
        RecurringTransactionBuilder {
            name: name.to_owned(),
            amount,
            is_expense: true,
            day_of_month,
            category_id: None,
            fx: None,
        }
    }

    /// The dates that transactions may still need to be generated for.
    ///
    /// The schedule continues after the checkpoint written by materialization.
    /// If transactions have never been generated, it starts after the creation
    /// time as seen in the timezone `offset`. Editing the recurring transaction
    /// does not change where the schedule starts.
    pub fn pending_schedule(&self, offset: UtcOffset) -> MonthlySchedule {
        match self.last_materialized_through {
            Some(checkpoint) => MonthlySchedule::after_date(checkpoint, self.day_of_month),
            None => MonthlySchedule::after(self.created_at.to_offset(offset), self.day_of_month),
        }
    }

    /// A transaction on `date` with a copy of this recurring transaction's fields.
    pub fn occurrence_on(&self, date: Date) -> TransactionBuilder {
        Transaction::build(&self.name, self.amount, date)
            .is_expense(self.is_expense)
            .category_id(self.category_id)
            .fx(self.fx.clone())
            .recurring_id(Some(self.id))
    }
}

/// A builder for creating or editing [RecurringTransaction] instances.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurringTransactionBuilder {
    /// The name copied to each generated transaction.
    pub name: String,
    /// The amount of each generated transaction, must be greater than zero.
    pub amount: f64,
    /// Whether the generated transactions are expenses or income.
    pub is_expense: bool,
    /// The day of the month the transaction happens on.
    pub day_of_month: DayOfMonth,
    /// The category of the generated transactions.
    pub category_id: Option<CategoryId>,
    /// The foreign currency details of the generated transactions.
    pub fx: Option<ForeignCurrency>,
}

impl RecurringTransactionBuilder {
    /// Set whether the recurring transaction is an expense or income.
    pub fn is_expense(mut self, is_expense: bool) -> Self {
        self.is_expense = is_expense;
        self
    }

    /// Set the category id for the recurring transaction.
    pub fn category_id(mut self, category_id: Option<CategoryId>) -> Self {
        self.category_id = category_id;
        self
    }

    /// Set the foreign currency details for the recurring transaction.
    pub fn fx(mut self, fx: Option<ForeignCurrency>) -> Self {
        self.fx = fx;
        self
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

const SELECT_COLUMNS: &str = "id, name, amount, is_expense, day_of_month, category_id, is_fx, \
    fx_rate, fx_symbol, created_at, updated_at, last_materialized_through";

/// Create a new recurring transaction in the database.
///
/// `now` is recorded as both the creation and edit time. Transactions are
/// generated for dates after `now`.
///
/// # Errors
/// This function will return a:
/// - validation error from [validate_financial_fields],
/// - [Error::InvalidCategory] if the category ID does not refer to a category,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_recurring_transaction(
    builder: RecurringTransactionBuilder,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<RecurringTransaction, Error> {
    validate_financial_fields(&builder.name, builder.amount, builder.fx.as_ref())?;

    let (fx_rate, fx_symbol) = split_fx(builder.fx.as_ref());
    let now = format_timestamp(now)?;

    connection
        .prepare(&format!(
            "INSERT INTO recurring_transaction
                (name, amount, is_expense, day_of_month, category_id, is_fx, fx_rate, fx_symbol, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             RETURNING {SELECT_COLUMNS}"
        ))?
        .query_row(
            (
                builder.name.trim(),
                builder.amount,
                builder.is_expense,
                builder.day_of_month.get(),
                builder.category_id,
                builder.fx.is_some(),
                fx_rate,
                fx_symbol,
                now,
            ),
            map_row,
        )
        .map_err(|error| map_foreign_key_error(error, builder.category_id))
}

/// Retrieve a recurring transaction by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid recurring transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_recurring_transaction(
    id: RecurringId,
    connection: &Connection,
) -> Result<RecurringTransaction, Error> {
    connection
        .prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM recurring_transaction WHERE id = :id"
        ))?
        .query_row(&[(":id", &id)], map_row)
        .map_err(|error| error.into())
}

/// Retrieve the IDs of all recurring transactions, in the same order as
/// [get_all_recurring_transactions].
///
/// Only the IDs are read, so a row with unreadable fields does not cause an error.
pub fn get_recurring_transaction_ids(connection: &Connection) -> Result<Vec<RecurringId>, Error> {
    connection
        .prepare("SELECT id FROM recurring_transaction ORDER BY name ASC, id ASC")?
        .query_map([], |row| row.get(0))?
        .map(|maybe_id| maybe_id.map_err(Error::from))
        .collect()
}

/// Retrieve all recurring transactions ordered by name.
pub fn get_all_recurring_transactions(
    connection: &Connection,
) -> Result<Vec<RecurringTransaction>, Error> {
    connection
        .prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM recurring_transaction ORDER BY name ASC, id ASC"
        ))?
        .query_map([], map_row)?
        .map(|maybe_recurring| maybe_recurring.map_err(Error::from))
        .collect()
}

/// Replace the fields of a recurring transaction and set its edit time to `now`.
///
/// The materialization checkpoint is left untouched, so editing a recurring
/// transaction never causes months to be skipped.
///
/// # Errors
/// This function will return a:
/// - validation error from [validate_financial_fields],
/// - [Error::UpdateMissingRecurring] if `id` does not refer to a recurring transaction,
/// - [Error::InvalidCategory] if the category ID does not refer to a category,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_recurring_transaction(
    id: RecurringId,
    builder: RecurringTransactionBuilder,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<RecurringTransaction, Error> {
    validate_financial_fields(&builder.name, builder.amount, builder.fx.as_ref())?;

    let (fx_rate, fx_symbol) = split_fx(builder.fx.as_ref());

    connection
        .prepare(&format!(
            "UPDATE recurring_transaction
             SET name = ?1, amount = ?2, is_expense = ?3, day_of_month = ?4, category_id = ?5,
                 is_fx = ?6, fx_rate = ?7, fx_symbol = ?8, updated_at = ?9
             WHERE id = ?10
             RETURNING {SELECT_COLUMNS}"
        ))?
        .query_row(
            (
                builder.name.trim(),
                builder.amount,
                builder.is_expense,
                builder.day_of_month.get(),
                builder.category_id,
                builder.fx.is_some(),
                fx_rate,
                fx_symbol,
                format_timestamp(now)?,
                id,
            ),
            map_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::UpdateMissingRecurring,
            error => map_foreign_key_error(error, builder.category_id),
        })
}

/// Delete a recurring transaction by ID.
///
/// Transactions generated from it are kept but no longer refer to it.
///
/// # Errors
/// Returns [Error::DeleteMissingRecurring] if the recurring transaction doesn't exist.
pub fn delete_recurring_transaction(
    id: RecurringId,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected =
        connection.execute("DELETE FROM recurring_transaction WHERE id = ?1", [id])?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingRecurring);
    }

    Ok(())
}

/// Record that transactions have been generated for `id` up to and including
/// the scheduled date `checkpoint`.
///
/// # Errors
/// Returns [Error::NotFound] if the recurring transaction doesn't exist.
pub fn set_last_materialized_through(
    id: RecurringId,
    checkpoint: Date,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE recurring_transaction SET last_materialized_through = ?1 WHERE id = ?2",
        (checkpoint, id),
    )?;

    if rows_affected == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}

/// Create the recurring transaction table in the database.
///
/// The category table must be created first.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_recurring_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS recurring_transaction (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                amount REAL NOT NULL,
                is_expense INTEGER NOT NULL,
                day_of_month INTEGER NOT NULL,
                category_id INTEGER,
                is_fx INTEGER NOT NULL DEFAULT 0,
                fx_rate REAL,
                fx_symbol TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_materialized_through TEXT,
                FOREIGN KEY(category_id) REFERENCES category(id) ON UPDATE CASCADE ON DELETE SET NULL
                )",
        (),
    )?;

    Ok(())
}

fn split_fx(fx: Option<&ForeignCurrency>) -> (Option<f64>, Option<String>) {
    match fx {
        Some(fx) => (Some(fx.rate), fx.symbol.clone()),
        None => (None, None),
    }
}

fn map_foreign_key_error(error: rusqlite::Error, category_id: Option<CategoryId>) -> Error {
    match error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: _,
                extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
            },
            _,
        ) => Error::InvalidCategory(category_id),
        error => error.into(),
    }
}

/// Timestamps are stored as RFC 3339 text in UTC.
fn format_timestamp(timestamp: OffsetDateTime) -> Result<String, rusqlite::Error> {
    timestamp
        .to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))
}

fn parse_timestamp(row: &Row, index: usize) -> Result<OffsetDateTime, rusqlite::Error> {
    let text: String = row.get(index)?;

    OffsetDateTime::parse(&text, &Rfc3339).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error))
    })
}

fn map_row(row: &Row) -> Result<RecurringTransaction, rusqlite::Error> {
    let raw_day: i64 = row.get(4)?;
    let is_fx: bool = row.get(6)?;
    let fx_rate: Option<f64> = row.get(7)?;

    let fx = match (is_fx, fx_rate) {
        (true, Some(rate)) => Some(ForeignCurrency {
            rate,
            symbol: row.get(8)?,
        }),
        _ => None,
    };

    Ok(RecurringTransaction {
        id: row.get(0)?,
        name: row.get(1)?,
        amount: row.get(2)?,
        is_expense: row.get(3)?,
        day_of_month: DayOfMonth::clamped(raw_day),
        category_id: row.get(5)?,
        fx,
        created_at: parse_timestamp(row, 9)?,
        updated_at: parse_timestamp(row, 10)?,
        last_materialized_through: row.get(11)?,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod recurring_query_tests {
    use rusqlite::Connection;
    use time::{
        UtcOffset,
        macros::{date, datetime},
    };

    use crate::{
        Error,
        category::{CategoryName, create_category},
        db::initialize,
        recurring::{
            DayOfMonth, RecurringTransaction, create_recurring_transaction,
            delete_recurring_transaction, get_all_recurring_transactions,
            get_recurring_transaction, get_recurring_transaction_ids,
            set_last_materialized_through, update_recurring_transaction,
        },
        transaction::{ForeignCurrency, create_transaction, get_transaction},
    };

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    fn day(day: i64) -> DayOfMonth {
        DayOfMonth::new(day).unwrap()
    }

    #[test]
    fn create_succeeds() {
        let conn = get_test_connection();
        let now = datetime!(2024-01-01 09:00 UTC);

        let recurring = create_recurring_transaction(
            RecurringTransaction::build("Rent", 450.0, day(31)),
            now,
            &conn,
        )
        .expect("Could not create recurring transaction");

        assert!(recurring.id > 0);
        assert_eq!(recurring.name, "Rent");
        assert_eq!(recurring.day_of_month, day(31));
        assert_eq!(recurring.created_at, now);
        assert_eq!(recurring.updated_at, now);
        assert_eq!(recurring.last_materialized_through, None);
        assert_eq!(
            recurring.pending_schedule(UtcOffset::UTC).next(),
            Some(date!(2024 - 01 - 31))
        );
    }

    #[test]
    fn create_stores_timestamps_in_utc() {
        let conn = get_test_connection();
        let now = datetime!(2024-01-01 09:00 +13);

        let recurring = create_recurring_transaction(
            RecurringTransaction::build("Rent", 450.0, day(1)),
            now,
            &conn,
        )
        .unwrap();

        assert_eq!(recurring.created_at, now);
        assert_eq!(recurring.created_at.offset(), time::UtcOffset::UTC);
    }

    #[test]
    fn create_fails_on_invalid_category() {
        let conn = get_test_connection();

        let result = create_recurring_transaction(
            RecurringTransaction::build("Rent", 450.0, day(1)).category_id(Some(9)),
            datetime!(2024-01-01 09:00 UTC),
            &conn,
        );

        assert_eq!(result, Err(Error::InvalidCategory(Some(9))));
    }

    #[test]
    fn create_fails_on_invalid_amount() {
        let conn = get_test_connection();

        let result = create_recurring_transaction(
            RecurringTransaction::build("Rent", 0.0, day(1)),
            datetime!(2024-01-01 09:00 UTC),
            &conn,
        );

        assert_eq!(result, Err(Error::InvalidAmount(0.0)));
    }

    #[test]
    fn get_returns_created_recurring_transaction() {
        let conn = get_test_connection();
        let category = create_category(CategoryName::new_unchecked("Bills"), &conn).unwrap();
        let created = create_recurring_transaction(
            RecurringTransaction::build("Phone", 30.0, day(12))
                .category_id(Some(category.id))
                .fx(Some(ForeignCurrency {
                    rate: 1.1,
                    symbol: Some("AUD".to_owned()),
                })),
            datetime!(2024-01-01 09:00 UTC),
            &conn,
        )
        .unwrap();

        assert_eq!(get_recurring_transaction(created.id, &conn), Ok(created));
    }

    #[test]
    fn get_fails_on_missing_id() {
        let conn = get_test_connection();

        assert_eq!(get_recurring_transaction(1, &conn), Err(Error::NotFound));
    }

    #[test]
    fn get_all_sorted_by_name() {
        let conn = get_test_connection();
        let now = datetime!(2024-01-01 09:00 UTC);
        for name in ["Salary", "Phone", "Rent"] {
            create_recurring_transaction(RecurringTransaction::build(name, 1.0, day(1)), now, &conn)
                .unwrap();
        }

        let names = get_all_recurring_transactions(&conn)
            .unwrap()
            .into_iter()
            .map(|recurring| recurring.name)
            .collect::<Vec<_>>();

        assert_eq!(names, ["Phone", "Rent", "Salary"]);
    }

    #[test]
    fn update_keeps_checkpoint_and_creation_time() {
        let conn = get_test_connection();
        let created_at = datetime!(2024-01-01 09:00 UTC);
        let checkpoint = date!(2024 - 03 - 15);
        let edited_at = datetime!(2024-04-02 10:00 UTC);
        let recurring = create_recurring_transaction(
            RecurringTransaction::build("Rnet", 450.0, day(15)),
            created_at,
            &conn,
        )
        .unwrap();
        set_last_materialized_through(recurring.id, checkpoint, &conn).unwrap();

        let updated = update_recurring_transaction(
            recurring.id,
            RecurringTransaction::build("Rent", 475.0, day(20)).is_expense(true),
            edited_at,
            &conn,
        )
        .expect("Could not update recurring transaction");

        assert_eq!(updated.name, "Rent");
        assert_eq!(updated.amount, 475.0);
        assert_eq!(updated.day_of_month, day(20));
        assert_eq!(updated.created_at, created_at);
        assert_eq!(updated.updated_at, edited_at);
        assert_eq!(updated.last_materialized_through, Some(checkpoint));
        assert_eq!(
            updated.pending_schedule(UtcOffset::UTC).next(),
            Some(date!(2024 - 03 - 20))
        );
    }

    #[test]
    fn update_fails_on_missing_id() {
        let conn = get_test_connection();

        let result = update_recurring_transaction(
            42,
            RecurringTransaction::build("Rent", 475.0, day(20)),
            datetime!(2024-04-02 10:00 UTC),
            &conn,
        );

        assert_eq!(result, Err(Error::UpdateMissingRecurring));
    }

    #[test]
    fn delete_keeps_generated_transactions() {
        let conn = get_test_connection();
        let recurring = create_recurring_transaction(
            RecurringTransaction::build("Rent", 450.0, day(15)),
            datetime!(2024-01-01 09:00 UTC),
            &conn,
        )
        .unwrap();
        let transaction =
            create_transaction(recurring.occurrence_on(date!(2024 - 01 - 15)), &conn).unwrap();

        delete_recurring_transaction(recurring.id, &conn).expect("Could not delete");

        assert_eq!(get_recurring_transaction(recurring.id, &conn), Err(Error::NotFound));
        let kept = get_transaction(transaction.id, &conn).unwrap();
        assert_eq!(kept.recurring_id, None);
        assert_eq!(kept.name, "Rent");
    }

    #[test]
    fn delete_fails_on_missing_id() {
        let conn = get_test_connection();

        assert_eq!(
            delete_recurring_transaction(3, &conn),
            Err(Error::DeleteMissingRecurring)
        );
    }

    #[test]
    fn out_of_range_day_in_database_is_clamped() {
        let conn = get_test_connection();
        let recurring = create_recurring_transaction(
            RecurringTransaction::build("Rent", 450.0, day(15)),
            datetime!(2024-01-01 09:00 UTC),
            &conn,
        )
        .unwrap();
        conn.execute(
            "UPDATE recurring_transaction SET day_of_month = 40 WHERE id = ?1",
            [recurring.id],
        )
        .unwrap();

        let got = get_recurring_transaction(recurring.id, &conn).unwrap();

        assert_eq!(got.day_of_month, DayOfMonth::LAST);
    }

    #[test]
    fn occurrence_copies_fields() {
        let conn = get_test_connection();
        let category = create_category(CategoryName::new_unchecked("Income"), &conn).unwrap();
        let recurring = create_recurring_transaction(
            RecurringTransaction::build("Salary", 3000.0, day(28))
                .is_expense(false)
                .category_id(Some(category.id)),
            datetime!(2024-01-01 09:00 UTC),
            &conn,
        )
        .unwrap();

        let transaction =
            create_transaction(recurring.occurrence_on(date!(2024 - 01 - 28)), &conn).unwrap();

        assert_eq!(transaction.name, "Salary");
        assert_eq!(transaction.amount, 3000.0);
        assert!(!transaction.is_expense);
        assert_eq!(transaction.category_id, Some(category.id));
        assert_eq!(transaction.recurring_id, Some(recurring.id));
        assert_eq!(transaction.date, date!(2024 - 01 - 28));
    }

    #[test]
    fn pending_schedule_resumes_after_checkpoint_date() {
        let conn = get_test_connection();
        let recurring = create_recurring_transaction(
            RecurringTransaction::build("Rent", 450.0, day(15)),
            datetime!(2024-01-01 09:00 UTC),
            &conn,
        )
        .unwrap();
        set_last_materialized_through(recurring.id, date!(2024 - 03 - 15), &conn).unwrap();
        let recurring = get_recurring_transaction(recurring.id, &conn).unwrap();

        // The checkpoint is a calendar date, so the offset does not matter.
        for offset in [UtcOffset::UTC, time::macros::offset!(+13), time::macros::offset!(-11)] {
            assert_eq!(
                recurring.pending_schedule(offset).next(),
                Some(date!(2024 - 04 - 15))
            );
        }
    }

    #[test]
    fn unreadable_timestamp_is_an_error_not_a_panic() {
        let conn = get_test_connection();
        let recurring = create_recurring_transaction(
            RecurringTransaction::build("Rent", 450.0, day(15)),
            datetime!(2024-01-01 09:00 UTC),
            &conn,
        )
        .unwrap();

        for garbage in ["garbage", "", "not-a-timestamp-at-all"] {
            conn.execute(
                "UPDATE recurring_transaction SET created_at = ?1 WHERE id = ?2",
                (garbage, recurring.id),
            )
            .unwrap();

            let result = get_recurring_transaction(recurring.id, &conn);

            assert!(
                matches!(result, Err(Error::SqlError(_))),
                "got {result:?} for {garbage:?}"
            );
        }
    }

    #[test]
    fn ids_can_be_read_when_a_row_is_unreadable() {
        let conn = get_test_connection();
        let now = datetime!(2024-01-01 09:00 UTC);
        let broken =
            create_recurring_transaction(RecurringTransaction::build("Broken", 1.0, day(1)), now, &conn)
                .unwrap();
        let working =
            create_recurring_transaction(RecurringTransaction::build("Working", 1.0, day(1)), now, &conn)
                .unwrap();
        conn.execute(
            "UPDATE recurring_transaction SET last_materialized_through = 'garbage' WHERE id = ?1",
            [broken.id],
        )
        .unwrap();

        assert_eq!(
            get_recurring_transaction_ids(&conn),
            Ok(vec![broken.id, working.id])
        );
        assert!(get_recurring_transaction(broken.id, &conn).is_err());
        assert!(get_all_recurring_transactions(&conn).is_err());
    }
}
