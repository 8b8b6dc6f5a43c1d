//! Provider-adaptive image generation.
//!
//! [`ImageRouter`] takes a normalized [`GenerationRequest`] plus a model
//! profile, picks the wire protocol the provider speaks for that model, and
//! returns the image as base64 with its MIME type.
//!
//! [`GenerationRequest`]: easel_contracts::request::GenerationRequest

pub mod config;
pub mod error;
mod http;
pub mod listing;
pub mod router;
pub mod transports;

pub use config::EngineConfig;
pub use error::{GenerationError, Result};
pub use listing::ModelLister;
pub use router::{select_route, ImageRouter, Route};
