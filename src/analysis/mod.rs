/// Read-side analysis of stored snapshots.
///
/// Turns the raw snapshot history into per-category series for display.
///
/// Submodules:
/// - `aggregate`: recency-weighted averages per snapshot and time filtering.

pub mod aggregate;
