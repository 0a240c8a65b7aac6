// Channel adapter implementations
pub mod discord;
pub mod email;
pub mod slack;
pub mod sms;

pub use discord::DiscordNotifier;
pub use email::EmailNotifier;
pub use slack::SlackNotifier;
pub use sms::SmsNotifier;
