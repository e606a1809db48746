//! # Portraify Kolors client
//!
//! Remote generation client for the SiliconFlow Kolors image-generation
//! API: wire types, scene-driven prompt construction, and a thin HTTP
//! client. One attempt per generation -- retry and fallback policy belong
//! to the caller.

pub mod api;
pub mod request;

pub use api::{KolorsApi, KolorsError, DEFAULT_ENDPOINT};
pub use request::{
    PortraitRequest, PortraitResponse, PortraitResult, PortraitStatus, RequestParameters,
    ResultMetadata,
};
