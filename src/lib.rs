#[cfg(feature = "cli")]
pub mod cli;
pub mod client;
pub mod engine;
pub mod error;
pub mod input;
pub mod model;
pub mod output;
pub mod util;
