pub mod browser;
pub mod config;
pub mod delivery;
pub mod discovery;
pub mod dispatch;
pub mod errors;
pub mod session;
pub mod store;
