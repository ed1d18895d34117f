//! Store Layer
//!
//! Everything that touches persistence:
//!
//! - [`DataStore`] - the select/insert/update/delete/subscribe/call surface
//! - [`MemoryStore`] and [`LibsqlStore`] - the two bundled backends
//! - [`Select`] / [`Filter`] / [`Order`] - query description and evaluation
//! - [`ChangeEvent`] / [`ChangeFeed`] - row-level change notifications
//! - [`RemoteProcedure`] - invite-code generation and privacy-filtered user search
//!
//! Rows are JSON objects ([`Record`]); typed models convert at this boundary
//! via [`to_record`] / [`from_record`].

mod data_store;
mod error;
pub mod events;
mod libsql_store;
mod memory_store;
pub mod procedures;
mod query;
mod record;

pub use data_store::DataStore;
pub use error::StoreError;
pub use events::{
    ChangeBus, ChangeEvent, ChangeFeed, ChangeKind, Subscription, DEFAULT_EVENT_CAPACITY,
};
pub use libsql_store::LibsqlStore;
pub use memory_store::MemoryStore;
pub use procedures::RemoteProcedure;
pub use query::{compare_values, is_path_within, matches_all, Direction, Filter, Order, Select};
pub use record::{
    apply_patch, format_timestamp, from_record, now_timestamp, prepare_insert, record_id,
    timestamp, to_record, Record,
};
