pub mod block;
pub mod config;
pub mod encoder;
pub mod error;
pub mod packer;
pub mod store;
pub mod volume;
