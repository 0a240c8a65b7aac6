pub mod manager;
pub mod notifiers;
pub mod traits;

pub use manager::{ChannelRegistry, Unavailable};
pub use traits::{AlertPayload, DeliveryReceipt, NotifierPlugin};
