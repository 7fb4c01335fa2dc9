//! Multimodal context assembly from user attachments.
//!
//! Each attachment is classified by extension, then turned into either a
//! text block or an image reference. A file that cannot be read or parsed
//! degrades to a warning and is skipped; only an entirely empty result is an
//! error the caller sees.

mod assembler;
mod kind;
mod pdf;

pub use assembler::assemble;
pub use kind::AttachmentKind;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    /// Every attachment degraded; there is nothing to send to the oracle.
    #[error("no usable content in any of the {0} attachment(s)")]
    Empty(usize),
}
