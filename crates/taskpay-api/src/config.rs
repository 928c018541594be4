use rust_decimal::Decimal;
use serde::Deserialize;
use taskpay_core::ProviderKind;
use taskpay_providers::{
    AirwallexConfig, EmailConfig, PayPalConfig, ProvidersConfig, StripeConfig,
};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSettings {
    /// Vendor used for new checkouts and payouts.
    pub provider: ProviderKind,
    pub platform_fee_rate: Decimal,
    pub currency: String,
    pub auto_payout: bool,
}

/// Runtime settings, read from `TASKPAY__SECTION__KEY` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub database_url: Option<String>,
    pub payment: PaymentSettings,
    #[serde(default)]
    pub stripe: Option<StripeConfig>,
    #[serde(default)]
    pub airwallex: Option<AirwallexConfig>,
    #[serde(default)]
    pub paypal: Option<PayPalConfig>,
    #[serde(default)]
    pub email: Option<EmailConfig>,
}

impl Settings {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::from_env(config::Environment::with_prefix("TASKPAY").separator("__"))
    }

    pub fn from_env(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("payment.provider", "stripe")?
            .set_default("payment.platform_fee_rate", "0.10")?
            .set_default("payment.currency", "AUD")?
            .set_default("payment.auto_payout", false)?
            .add_source(environment)
            .build()?
            .try_deserialize()
    }

    pub fn providers(&self) -> ProvidersConfig {
        ProvidersConfig {
            stripe: self.stripe.clone(),
            airwallex: self.airwallex.clone(),
            paypal: self.paypal.clone(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
