//! Handlers 模块

pub mod devices;
pub mod status;

pub use devices::*;
pub use status::*;
