pub mod backends;
pub mod transport;
