//! Kindle Relay — converts uploaded books to EPUB and mails them to a fixed
//! set of Kindle addresses.

pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
