#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod allocation;
pub mod auth;
pub mod client;
pub mod error;
pub mod proto;
pub mod relay;
pub mod server;

pub use error::{Error, Result};
