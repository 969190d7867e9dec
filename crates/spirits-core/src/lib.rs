//! spirits-core - Core library for Good Spirits
//!
//! Identity clocks, check-in records, and the synchronizing store that lets
//! independent sites record check-ins and read them back as a change feed.

pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod services;

pub use error::{Error, Result};
pub use models::{GlobalId, Model, SiteId, Token, Visibility};
pub use services::{DataLayer, WriteIntent};
