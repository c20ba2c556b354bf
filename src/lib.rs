pub mod client;
pub mod config;
pub mod daemon;
pub mod domains;
pub mod error;
pub mod factories;
pub mod interfaces;
pub mod providers;
pub mod services;

pub use crate::client::YellowTracker;
pub use crate::config::Config;
pub use crate::error::{Result, YellowTrackerError};
pub use crate::interfaces::providers::ImageInput;
pub use crate::services::conversation::{InboundMessage, TurnReply, TurnStatus};
