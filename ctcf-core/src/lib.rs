pub mod bed;
pub mod config;
pub mod dataset;
pub mod error;
pub mod feature;
pub mod fimo;
pub mod inference;
pub mod model;
pub mod posterior;
pub mod sampler;
pub mod utils;

pub use error::{Error, Result};
