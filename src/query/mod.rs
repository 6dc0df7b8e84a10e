//! Query building.
//!
//! A [`Query`] accumulates a [`QueryState`] through builder methods and runs
//! it with one terminal method. SQL assembly and WHERE compilation are pure
//! functions of the state, so they can be tested and benchmarked without a
//! database.
//!
//! # Placeholder discipline
//!
//! Every value reaches the driver as a bound parameter, `IN` lists included.
//! The only unbound SQL comes from raw fragments (`where_raw`, `join`,
//! `select`, `Changes::raw`), which are inserted verbatim.

mod builder;
mod compiler;
mod conditions;
mod predicate;
mod sql;
mod state;

pub use builder::{KeyedColumn, Query, WhereGroup};
pub use compiler::{compile, quote_column};
pub use conditions::Conditions;
pub use predicate::{Logic, Operand, Operator, PredicateNode};
pub use sql::{
    Statement, build_count, build_delete, build_insert, build_insert_list, build_select,
    build_update, format_table, interpolate,
};
pub use state::{Limit, QueryState};
