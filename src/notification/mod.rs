pub mod connector;
pub mod fanout;

pub use connector::{BotConnectorClient, BotCredentials, ConversationSender};
pub use fanout::{FanoutDispatcher, FanoutReport};
