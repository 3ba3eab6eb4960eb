//! Email-to-task bridge: raw MIME parsing, provider links and token glue,
//! and the receiver that turns a message into an analyzed task.

pub mod parser;
pub mod providers;
mod receiver;

pub use parser::{parse_raw, IncomingEmail};
pub use providers::{message_link, MailOAuth, ProviderTokens};
pub use receiver::{EmailReceiver, EmailTaskResult};
