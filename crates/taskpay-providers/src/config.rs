use serde::{Deserialize, Serialize};

fn default_stripe_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_airwallex_base_url() -> String {
    "https://api-demo.airwallex.com/api/v1".to_string()
}

fn default_paypal_base_url() -> String {
    "https://api-m.sandbox.paypal.com".to_string()
}

fn default_email_base_url() -> String {
    "https://api.resend.com".to_string()
}

fn default_success_url() -> String {
    "http://localhost:5173/payment/success".to_string()
}

fn default_cancel_url() -> String {
    "http://localhost:5173/payment/cancelled".to_string()
}

/// Seconds of clock skew tolerated on signed webhook timestamps.
fn default_tolerance() -> i64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    #[serde(default = "default_stripe_base_url")]
    pub base_url: String,
    #[serde(default = "default_success_url")]
    pub success_url: String,
    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,
    #[serde(default = "default_tolerance")]
    pub webhook_tolerance_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirwallexConfig {
    pub client_id: String,
    pub api_key: String,
    pub webhook_secret: String,
    #[serde(default = "default_airwallex_base_url")]
    pub base_url: String,
    #[serde(default = "default_success_url")]
    pub return_url: String,
    /// Account currency transfers are funded from.
    #[serde(default)]
    pub source_currency: Option<String>,
    #[serde(default = "default_tolerance")]
    pub webhook_tolerance_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub webhook_id: String,
    #[serde(default = "default_paypal_base_url")]
    pub base_url: String,
    #[serde(default = "default_success_url")]
    pub return_url: String,
    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub api_key: String,
    pub from: String,
    #[serde(default = "default_email_base_url")]
    pub base_url: String,
}

/// Credentials for every vendor that may be used. Absent sections are simply not registered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub stripe: Option<StripeConfig>,
    #[serde(default)]
    pub airwallex: Option<AirwallexConfig>,
    #[serde(default)]
    pub paypal: Option<PayPalConfig>,
}
