//! Engine services built on the store contract

mod data_layer;

pub use data_layer::{DataLayer, WriteIntent};
