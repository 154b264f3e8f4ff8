//! Message bus client for communicating with the rest of the assistant

mod client;
mod message;

pub use client::{BusClient, BusError};
pub use message::{topic, Message};
