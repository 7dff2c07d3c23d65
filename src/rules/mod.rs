//! Pure rule primitives used by the compliance engine.
//!
//! Everything in this module is a pure function over its inputs: no clocks,
//! no shared state, no collaborators. The engine composes these into the
//! four traffic checks.

pub mod geo;
pub mod plate;
pub mod time_window;

pub use geo::{haversine_km, point_in_polygon, GeoPoint, GeoRect};
pub use plate::terminal_digit;
pub use time_window::TimeWindow;
