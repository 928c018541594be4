pub mod airwallex;
pub mod config;
pub mod email;
pub mod error;
pub mod paypal;
pub mod registry;
pub mod stripe;
pub mod webhook;

// Re-exports
pub use airwallex::AirwallexProvider;
pub use config::{AirwallexConfig, EmailConfig, PayPalConfig, ProvidersConfig, StripeConfig};
pub use email::EmailNotifier;
pub use error::{Error, Result};
pub use paypal::PayPalProvider;
pub use registry::build_registry;
pub use stripe::StripeProvider;
