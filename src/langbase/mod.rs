//! Langbase Pipes client used as the production thinking backend.

mod client;
mod types;

pub use client::*;
pub use types::*;
