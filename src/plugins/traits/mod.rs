pub mod notifier;

pub use notifier::{AlertPayload, DeliveryReceipt, NotifierPlugin};
