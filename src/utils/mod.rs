pub mod distance;
pub mod dns;
pub(crate) mod domain;
pub(crate) mod patterns;
pub mod smtp;
