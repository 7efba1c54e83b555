//! Relay construction and the public front end

mod builder;
mod relay;

pub use builder::{MirrorFetch, MirrorFetchBuilder};
pub use relay::Relay;
