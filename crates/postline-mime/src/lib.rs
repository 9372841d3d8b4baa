//! # postline-mime
//!
//! Message model and MIME assembly for outgoing email.
//!
//! ## Features
//!
//! - **Address parsing**: free-form `Display Name <email>` strings
//! - **Header encoding**: RFC 2047 encoded-words, chunked and folded
//! - **Multipart nesting**: mixed, related and alternative, each with its own boundary
//! - **Streaming files**: attachments are base64-encoded from disk while sending
//!
//! ## Quick Start
//!
//! ```ignore
//! use postline_mime::{Message, Segment};
//!
//! let mut msg = Message::new();
//! msg.set_from("Ann Lee <ann@example.com>")?;
//! msg.add_to("bob@example.com")?;
//! msg.set_subject("Quarterly numbers")?;
//! msg.add_text_part("Numbers attached.", "plain", None)?;
//! let cid = msg.embed_file("chart.png", None)?;
//! msg.add_text_part(format!("<img src=\"cid:{cid}\">"), "html", None)?;
//! msg.attach_file("q3.xlsx", None)?;
//!
//! let rendered = msg.render().await?;
//! for segment in rendered.body() {
//!     match segment {
//!         Segment::Bytes(bytes) => { /* write bytes */ }
//!         Segment::File(file) => {
//!             let mut stream = file.open().await?;
//!             while let Some(chunk) = stream.next_chunk().await.map_err(|e| file.read_error(e))? {
//!                 /* write chunk */
//!             }
//!         }
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod address;
mod content_type;
mod error;
mod header;
mod message;
mod render;

pub mod encoding;

pub use address::Address;
pub use content_type::{ContentType, DEFAULT_FILE_TYPE};
pub use encoding::Base64Stream;
pub use error::{Error, Result};
pub use header::{Header, Headers};
pub use message::{
    AttachedFile, DEFAULT_CHARSET, EmbeddedFile, Message, Structure, TextPart, TransferEncoding,
};
pub use render::{FileSource, Rendered, Segment, generate_boundary};
