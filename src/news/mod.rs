//! News parsing subsystem (C10): source profiles plus the extraction
//! pipeline that turns a raw crawl into a deduplicated, classified feed.

pub mod parser;
pub mod profile;

pub use parser::{parse, ContentType, Feed, ParseError, Story};
pub use profile::{resolve as resolve_profile, SourceProfile};
