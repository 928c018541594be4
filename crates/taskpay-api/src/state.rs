use std::sync::Arc;

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<taskpay_core::PaymentEngine>,
    pub airwallex: Option<Arc<taskpay_providers::AirwallexProvider>>,
    pub currency: String,
}
