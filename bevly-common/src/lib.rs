//! # Bevly Common Library
//!
//! Shared code for the bevly workspace including:
//! - Beverage and menu provider model types
//! - Error type and result alias
//! - Bootstrap configuration loading
//! - Injectable clock
//! - Sync event bus

pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod time;

pub use error::{Error, Result};
pub use model::{Beverage, BeverageId, MenuProvider, Rating};
