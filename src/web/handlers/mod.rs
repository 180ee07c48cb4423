//! HTTP request handlers, one module per area

pub mod artifacts;
pub mod events;
pub mod health;
pub mod pairing;
pub mod streams;
