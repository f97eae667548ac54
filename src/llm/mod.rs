mod client;
pub use client::*;

mod manager;
pub use manager::*;

mod error;
pub use error::*;
