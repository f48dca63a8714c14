pub mod client;
pub mod pricing;
pub mod prompts;
pub mod retry;
pub mod template;

pub use client::*;
pub use retry::*;
