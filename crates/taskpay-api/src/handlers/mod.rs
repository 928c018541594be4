pub mod airwallex;
pub mod health;
pub mod payments;
pub mod stats;
pub mod webhook;
