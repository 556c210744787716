//! Transaction management for the budgeting application.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and `TransactionBuilder` for creating transactions
//! - Database functions for storing and querying transactions
//! - Route handlers for listing, entering, editing and deleting transactions

mod core;
mod endpoints;

pub use core::{
    ForeignCurrency, Transaction, TransactionBuilder, create_transaction,
    create_transaction_table, delete_transaction, get_all_transactions,
    get_transaction_dates_for_recurring, update_transaction, validate_financial_fields,
};
pub use endpoints::{
    create_transaction_endpoint, delete_transaction_endpoint, get_transactions_endpoint,
    update_transaction_endpoint,
};

#[cfg(test)]
pub use core::{count_transactions, get_transaction};
