//! # Contracts
//!
//! Frozen interface contracts shared by every ingestion crate.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Delivery Model
//! - One `Message` per `DetectionRecord`, keyed by detection id
//! - Each accepted send yields exactly one `DeliveryEvent`
//! - `DeliveryError::is_retriable` decides between retry and abort

mod config;
mod delivery;
mod detection;
mod error;
mod message;

pub use config::*;
pub use delivery::*;
pub use detection::*;
pub use error::*;
pub use message::*;
