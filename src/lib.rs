pub mod data;
pub mod error;
pub mod interface;
pub mod model;
pub mod preprocessing;
pub mod recognizer;
pub mod server;
pub mod training;
