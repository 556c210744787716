//! Generates the transactions that recurring transactions imply, up to the present.
//!
//! For each recurring transaction, dates are taken from its [MonthlySchedule]
//! starting after its catch-up anchor and stopping before `now`. A transaction
//! is created for each date unless the recurring transaction already has one in
//! that calendar month. Running it again with the same `now` creates nothing.

use std::collections::HashSet;

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use time::{Date, Month, OffsetDateTime};

use crate::{
    Error,
    database_id::RecurringId,
    recurring::{
        MonthlySchedule, RecurringTransaction, get_recurring_transaction,
        get_recurring_transaction_ids, schedule::local_midnight, set_last_materialized_through,
    },
    transaction::{create_transaction, get_transaction_dates_for_recurring},
};

/// The outcome of [materialize_all].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializeSummary {
    /// The number of transactions that were created and committed.
    pub created: usize,
    /// The recurring transactions that could not be processed.
    ///
    /// Nothing was written for these, they are retried on the next run.
    pub failed: Vec<RecurringId>,
}

/// The dates a single recurring transaction needs transactions for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OccurrencePlan {
    /// Dates to create transactions for, in increasing order.
    pub dates: Vec<Date>,
    /// The last date from the schedule that is before `now`, whether or not it
    /// needs a transaction.
    pub last_considered: Option<Date>,
}

/// Work out which dates from `schedule` need a transaction.
///
/// Dates are taken until one does not start before `now`, where a date starts
/// at midnight in the timezone of `now`. Months in `existing` (year, month)
/// already have a transaction and are skipped.
pub fn plan_occurrences(
    schedule: MonthlySchedule,
    existing: &HashSet<(i32, Month)>,
    now: OffsetDateTime,
) -> OccurrencePlan {
    let mut plan = OccurrencePlan::default();
    let offset = now.offset();

    for candidate in schedule.take_while(|candidate| local_midnight(*candidate, offset) < now) {
        plan.last_considered = Some(candidate);

        if existing.contains(&(candidate.year(), candidate.month())) {
            tracing::debug!("{candidate}: a transaction already exists this month");
            continue;
        }

        tracing::debug!("{candidate}: adding new transaction");
        plan.dates.push(candidate);
    }

    plan
}

/// Create the missing transactions for every recurring transaction, up to but
/// not including `now`.
///
/// Dates are calendar dates in the timezone of `now`.
///
/// Each recurring transaction is read and processed in its own database
/// transaction: its existing transactions are read, the missing ones are
/// inserted and its checkpoint is advanced, all or nothing. A failure for one
/// recurring transaction, including a row that cannot be read, is logged,
/// recorded in [MaterializeSummary::failed] and does not stop the others.
/// Only committed transactions are counted.
///
/// `connection` must not already be inside a transaction.
///
/// # Errors
/// Returns an error if the list of recurring transactions cannot be read.
pub fn materialize_all(
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<MaterializeSummary, Error> {
    let recurring_ids = get_recurring_transaction_ids(connection)?;

    let results = recurring_ids
        .iter()
        .map(|&recurring_id| {
            (
                recurring_id,
                materialize_recurring_transaction(recurring_id, now, connection),
            )
        })
        .collect::<Vec<_>>();

    let mut summary = MaterializeSummary::default();

    for (recurring_id, result) in results {
        match result {
            Ok(created) => summary.created += created,
            Err(error) => {
                tracing::error!(
                    "could not create transactions for recurring transaction {recurring_id}: {error}"
                );
                summary.failed.push(recurring_id);
            }
        }
    }

    tracing::info!(
        "Checked {} recurring transactions: {} transactions created, {} failed",
        recurring_ids.len(),
        summary.created,
        summary.failed.len()
    );

    Ok(summary)
}

/// Create the missing transactions for one recurring transaction and return
/// how many were created.
fn materialize_recurring_transaction(
    recurring_id: RecurringId,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<usize, Error> {
    // IMMEDIATE takes the write lock before the template and its existing
    // transactions are read, so concurrent runs see each other's checkpoints.
    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate)?;

    let recurring = match get_recurring_transaction(recurring_id, &transaction) {
        Ok(recurring) => recurring,
        Err(Error::NotFound) => {
            tracing::debug!("recurring transaction {recurring_id} was deleted, skipping");
            return Ok(0);
        }
        Err(error) => return Err(error),
    };

    tracing::debug!(
        "checking recurring transaction '{}' (id: {}) from {:?}",
        recurring.name,
        recurring.id,
        recurring.last_materialized_through
    );

    let existing = get_transaction_dates_for_recurring(recurring.id, &transaction)?
        .into_iter()
        .map(|date| (date.year(), date.month()))
        .collect::<HashSet<_>>();

    let plan = plan_occurrences(recurring.pending_schedule(now.offset()), &existing, now);

    let created = insert_occurrences(&recurring, &plan.dates, &transaction)?;

    if let Some(last_considered) = plan.last_considered {
        set_last_materialized_through(recurring.id, last_considered, &transaction)?;
    }

    transaction.commit()?;

    Ok(created)
}

/// Insert a transaction for each of `dates` and return how many were inserted.
///
/// A date whose month already has a transaction for `recurring` is skipped.
fn insert_occurrences(
    recurring: &RecurringTransaction,
    dates: &[Date],
    connection: &Connection,
) -> Result<usize, Error> {
    let mut created = 0;

    for &date in dates {
        match create_transaction(recurring.occurrence_on(date), connection) {
            Ok(_) => created += 1,
            Err(Error::DuplicateRecurringMonth(date)) => {
                tracing::debug!("{date}: already materialized, skipping");
            }
            Err(error) => return Err(error),
        }
    }

    Ok(created)
}

#[cfg(test)]
mod plan_tests {
    use std::collections::HashSet;

    use time::{
        Month,
        macros::{date, datetime},
    };

    use crate::recurring::{DayOfMonth, MonthlySchedule};

    use super::plan_occurrences;

    fn day(day: i64) -> DayOfMonth {
        DayOfMonth::new(day).unwrap()
    }

    #[test]
    fn plans_one_date_per_past_month() {
        let plan = plan_occurrences(
            MonthlySchedule::after(datetime!(2024-01-01 00:00 UTC), day(15)),
            &HashSet::new(),
            datetime!(2024-04-10 00:00 UTC),
        );

        assert_eq!(
            plan.dates,
            [date!(2024 - 01 - 15), date!(2024 - 02 - 15), date!(2024 - 03 - 15)]
        );
        assert_eq!(plan.last_considered, Some(date!(2024 - 03 - 15)));
    }

    #[test]
    fn plans_clamped_dates_for_day_31() {
        let plan = plan_occurrences(
            MonthlySchedule::after(datetime!(2024-01-31 00:00 UTC), day(31)),
            &HashSet::new(),
            datetime!(2024-04-01 00:00 UTC),
        );

        assert_eq!(plan.dates, [date!(2024 - 02 - 29), date!(2024 - 03 - 31)]);
    }

    #[test]
    fn skips_months_with_existing_transactions() {
        let existing = HashSet::from([(2024, Month::February)]);

        let plan = plan_occurrences(
            MonthlySchedule::after(datetime!(2024-01-01 00:00 UTC), day(15)),
            &existing,
            datetime!(2024-04-10 00:00 UTC),
        );

        assert_eq!(plan.dates, [date!(2024 - 01 - 15), date!(2024 - 03 - 15)]);
        assert_eq!(plan.last_considered, Some(date!(2024 - 03 - 15)));
    }

    #[test]
    fn last_considered_includes_skipped_month() {
        let existing = HashSet::from([(2024, Month::March)]);

        let plan = plan_occurrences(
            MonthlySchedule::after(datetime!(2024-02-20 00:00 UTC), day(15)),
            &existing,
            datetime!(2024-04-10 00:00 UTC),
        );

        assert!(plan.dates.is_empty());
        assert_eq!(plan.last_considered, Some(date!(2024 - 03 - 15)));
    }

    #[test]
    fn candidate_at_now_is_not_planned() {
        let plan = plan_occurrences(
            MonthlySchedule::after(datetime!(2024-01-01 00:00 UTC), day(15)),
            &HashSet::new(),
            datetime!(2024-03-15 00:00 UTC),
        );

        assert_eq!(plan.dates, [date!(2024 - 01 - 15), date!(2024 - 02 - 15)]);
    }

    #[test]
    fn anchor_in_future_plans_nothing() {
        let plan = plan_occurrences(
            MonthlySchedule::after(datetime!(2025-01-01 00:00 UTC), day(15)),
            &HashSet::new(),
            datetime!(2024-04-10 00:00 UTC),
        );

        assert_eq!(plan, Default::default());
    }

    #[test]
    fn anchor_equal_to_now_plans_nothing() {
        let now = datetime!(2024-04-10 00:00 UTC);

        let plan = plan_occurrences(MonthlySchedule::after(now, day(15)), &HashSet::new(), now);

        assert_eq!(plan, Default::default());
    }
}
