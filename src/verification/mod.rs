pub mod api;
pub mod identity;

pub use api::HttpIdentityResolver;
pub use identity::{IdentityResolver, IdentityScorer, NoIdentityResolver};
