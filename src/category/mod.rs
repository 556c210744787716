//! Categories for grouping transactions and recurring transactions.

mod core;
mod endpoints;

pub use core::{
    Category, CategoryName, create_category, create_category_table, delete_category,
    get_all_categories, get_category, update_category,
};
pub use endpoints::{
    create_category_endpoint, delete_category_endpoint, get_categories_endpoint,
    update_category_endpoint,
};
