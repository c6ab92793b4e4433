//! Backend core for an image-transformation studio driven by Gemini-style
//! endpoints.
//!
//! The crate covers the non-UI half of the application: durable service
//! profiles with encrypted credentials ([`profile_store`], [`registry`]),
//! the two wire dialects spoken by official and relay endpoints
//! ([`dialect`]), the request adapter that turns edit and video requests
//! into provider calls ([`client`]), the bounded long-running-operation
//! poller ([`poller`]), and a thin sequencing layer for multi-step
//! transformations ([`orchestrator`]).

pub mod client;
pub mod dialect;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod poller;
pub mod profile_store;
pub mod registry;
pub mod secrets;
pub mod utils;

pub use client::{GenerationClient, IMAGE_MODEL, VIDEO_MODEL};
pub use error::{Result, StudioError};
pub use models::{AspectRatio, GenerationResult, InlineImage, ProfileKind, ServiceProfile};
pub use orchestrator::{NoWatermark, Orchestrator, TransformationPlan, Watermark};
pub use poller::{Operation, PollBudget};
pub use profile_store::ProfileStore;
pub use registry::{CustomField, ProfileRegistry, Selection};
