pub mod db;
pub mod gate;
pub mod notifier;

pub use db::PgTrackingStore;
pub use gate::{hash_password, OperatorGate};
pub use notifier::{LogNotifier, WebhookNotifier};
