//! Ship fitting simulator core: attribute registry, effect catalog, modified
//! attribute stores and the fit aggregator that drives them.

pub mod cli;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod parallel;
pub mod persist;
pub mod service;

pub use error::{Error, Result};
