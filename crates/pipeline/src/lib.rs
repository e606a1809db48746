//! # Portraify pipeline
//!
//! The generation flow: one remote attempt when a client is configured,
//! the local canvas-filter renderer as the fallback, and the commit of the
//! finished portrait into the store.

pub mod generator;
pub mod local;

pub use generator::{GenerationError, GenerationOutcome, PortraitGenerator};
