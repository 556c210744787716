//! Recurring transactions and the generation of their transactions.
//!
//! A recurring transaction is a template for a transaction that happens on
//! the same day every month. [MonthlySchedule] turns the template's day of the
//! month into dates and [materialize_all] creates the transactions for the
//! dates that have passed.

mod core;
mod endpoints;
mod materialize;
mod schedule;

pub use core::{
    RecurringTransaction, RecurringTransactionBuilder, create_recurring_transaction,
    create_recurring_transaction_table, delete_recurring_transaction,
    get_all_recurring_transactions, get_recurring_transaction, get_recurring_transaction_ids,
    set_last_materialized_through, update_recurring_transaction,
};
pub use endpoints::{
    create_recurring_transaction_endpoint, delete_recurring_transaction_endpoint,
    get_recurring_transactions_endpoint, materialize_endpoint,
    update_recurring_transaction_endpoint,
};
pub use materialize::{MaterializeSummary, OccurrencePlan, materialize_all, plan_occurrences};
pub use schedule::{DayOfMonth, MonthlySchedule, first_candidate, next_tick};
