//! Precomputed output-to-source mapping templates.

/// Binary template format.
pub mod io;
/// Template data model and builder.
pub mod model;
