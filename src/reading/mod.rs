//! Reading domain: typed entities, cache records and the gateway that
//! serves them cache-first.

mod download;
mod error;
mod gateway;
mod normalize;
mod records;
mod refresh;
mod types;


pub use download::{DownloadEvent, DownloadHandle};
pub use error::{DecodeError, GatewayError};
pub use gateway::{GatewaySettings, ReadingGateway};
pub use refresh::RefreshPolicy;
pub use types::{Book, Bookmark, Heading, HeadingContent, NewBookmark, ReadingStats, Volume};
