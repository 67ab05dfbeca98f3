//! Shared primitive types used across the crate.

/// A technician code such as `TR12345`. Empty when nothing could be extracted.
pub type TechCode = String;

/// A reporting period in `YYYY-MM` form.
pub type Period = String;

/// The canonical sync-run identifier.
pub type RunId = String;
