pub mod client;
pub mod server;
pub mod shared;
pub mod store;
