//! Testing utilities for the engram workspace.

mod world;

pub use world::{message_request, TestWorld};
