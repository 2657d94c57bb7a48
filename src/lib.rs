pub mod anchor;
pub mod config;
pub mod error;
pub mod geometry;
pub mod localization;
pub mod sim;
pub mod system;

pub use anchor::{Anchor, AnchorId, AnchorPayload, AnchorStatus, AnchorUpdate};
pub use config::{AnchorsConfiguration, ServiceConfig, Settings};
pub use error::AnchorError;
pub use geometry::SE3;
pub use localization::{LocalizationFailureReason, LocalizationState, LocalizationStateUpdate};
pub use system::AnchorService;
