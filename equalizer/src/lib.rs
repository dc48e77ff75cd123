mod backend;
mod common;
mod image;
mod metrics;
mod ops;
mod pipeline;
mod plot;

pub mod prelude;

pub use prelude::*;
