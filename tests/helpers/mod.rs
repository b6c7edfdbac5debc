#![allow(unused_imports)]
pub mod conversation_helpers;
pub mod mock_chat_api;

pub use conversation_helpers::*;
pub use mock_chat_api::*;
