//! Source access: fetching raw bytes and decoding them to text.

pub mod decode;
pub mod source;

pub use decode::decode_text;
pub use source::{AnySource, FileSource, HttpSource, RawRecordSource};
