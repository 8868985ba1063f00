pub mod config;
pub mod error;
pub mod gateway;
pub mod message;
pub mod negotiate;
pub mod session;
pub mod stream;
