//! Cache-first reading data gateway.
//!
//! `reading::ReadingGateway` serves books, headings, content, bookmarks and
//! reading stats from a local TTL cache, falling back to a remote document
//! store and revalidating stale books in the background.

pub mod assistant;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod reading;
pub mod remote;

#[cfg(test)]
mod testing;
