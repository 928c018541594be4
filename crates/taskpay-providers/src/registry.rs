use crate::airwallex::AirwallexProvider;
use crate::config::ProvidersConfig;
use crate::paypal::PayPalProvider;
use crate::stripe::StripeProvider;
use crate::{Error, Result};
use std::sync::Arc;
use taskpay_core::{ProviderKind, ProviderRegistry};

/// Register every vendor with credentials present and select `active` for new payments.
pub fn build_registry(active: ProviderKind, config: &ProvidersConfig) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new(active);

    if let Some(ref stripe) = config.stripe {
        registry.register(Arc::new(StripeProvider::new(stripe.clone())));
    }
    if let Some(ref airwallex) = config.airwallex {
        registry.register(Arc::new(AirwallexProvider::new(airwallex.clone())));
    }
    if let Some(ref paypal) = config.paypal {
        registry.register(Arc::new(PayPalProvider::new(paypal.clone())));
    }

    if !registry.configured().contains(&active) {
        return Err(Error::ConfigError(format!(
            "Payment provider '{}' is selected but has no credentials configured",
            active
        )));
    }

    tracing::info!(
        "Payment providers configured: {:?} (active: {})",
        registry.configured(),
        active
    );

    Ok(registry)
}
