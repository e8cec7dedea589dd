//! Audio processing nodes.
//!
//! | Node | Inputs | Outputs | Description |
//! |------|--------|---------|-------------|
//! | [`HearingAid`] | 1 | 1 | Filterbank + three-stage WDRC |
//!
//! The queue endpoints live in [`io`](crate::io).

mod hearing_aid;

pub use hearing_aid::HearingAid;
