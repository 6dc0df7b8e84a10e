//! Data models exchanged with callers.
//!
//! - [`Value`]: a bound parameter or a column value
//! - [`Row`]: one result record
//! - [`Record`] / [`Changes`]: insert and update payloads
//! - [`Page`]: pagination request and computed totals

mod page;
mod record;
mod row;
mod value;

pub use page::Page;
pub use record::{ArithOp, Assignment, Changes, Record};
pub use row::Row;
pub use value::Value;
