pub mod client;
pub mod context;
pub mod prompts;
pub mod router;

pub use client::*;
pub use context::*;
pub use prompts::*;
pub use router::*;
