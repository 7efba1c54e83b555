//! Public types for the mirrorfetch API.

mod endpoint;
mod media;
mod resource;

pub use endpoint::{Endpoint, RequestClass};
pub use media::MediaHandle;
pub use resource::ResourceId;
