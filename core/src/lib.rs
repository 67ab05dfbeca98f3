//! Field-technician KPI reconciliation.
//!
//! Joins the operations export (who executed which service order, when, and
//! how it ended) against the HR roster (who reports to whom) and derives
//! repeat-visit rates, success counts and quartile rankings per technician,
//! supervisor, coordinator and city.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod identifier;
pub mod ranking;
pub mod roster;
pub mod source;
pub mod store;
pub mod sync;
pub mod timestamp;
pub mod types;
