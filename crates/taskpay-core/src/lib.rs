pub mod model;
pub mod fees;
pub mod events;
pub mod provider;
pub mod store;
pub mod notify;
pub mod engine;
pub mod error;

// Re-exports
pub use model::{
    PaymentStatus, Payout, PayoutDestination, PayoutStatus, Profile, ProviderKind, Task,
    TaskState, TaskStatus,
};
pub use fees::{FeeSchedule, FeeSplit};
pub use events::{EventKind, PaymentEvent, TaskRef};
pub use provider::{
    CheckoutRequest, CheckoutSession, PaymentConfirmation, PaymentProvider, PayoutReceipt,
    PayoutRequest, ProviderRegistry, WebhookHeaders,
};
pub use store::{EventRecord, InMemoryStore, PaymentStore, PaymentSummary};
pub use notify::{NoopNotifier, Notifier};
pub use engine::{PaymentEngine, WebhookOutcome};
pub use error::{Error, Result};
