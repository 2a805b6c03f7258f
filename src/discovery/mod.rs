//! Address discovery from web content.

mod crawler;
mod extract;

pub use crawler::crawl;
pub use extract::extract;
