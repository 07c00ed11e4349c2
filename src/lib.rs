//! Library for query-by-example definitions.
//!
//! A query is described by a [`QueryDefinition`](query/struct.QueryDefinition.html):
//! selected fields, placed tables, explicit joins and a WHERE tree. Queries
//! are read and written as XML against a schema, edited at one of three
//! builder tiers, and rendered as SQL.

#[macro_use]
extern crate lazy_static;

pub mod codec;
pub mod expr;
pub mod ops;
pub mod query;
pub mod schema;
pub mod sql;
pub mod tier;
pub mod xml;

mod map;
mod util;
