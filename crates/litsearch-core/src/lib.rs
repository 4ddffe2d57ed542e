#![deny(unused_variables)]
#![warn(dead_code)]
#![warn(unused_imports)]

pub mod config;
pub mod error;
pub mod facet;
pub mod key;
pub mod lexicon;
pub mod loader;
pub mod query;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
