//! Pipeline stages for document-to-Markdown conversion.
//!
//! Each submodule implements one step. None of them knows about any
//! particular document format; format knowledge lives in
//! [`crate::converters`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ sniff ──────────────▶ dispatch ──▶ postprocess
//! (path/    (zip_probe,           (registry)    (normalise)
//!  stream)   signatures,
//!            substitute)
//! ```
//!
//! 1. [`input`]  — uniform access to a path or an open stream, plus the
//!    position-restoring helper every later stage relies on
//! 2. [`sniff`]  — rank [`crate::StreamInfo`] guesses from the filename hint
//!    and the first bytes; ZIP containers are looked into by [`zip_probe`]
//!    and raw mimetypes are canonicalised by [`substitute`]
//! 3. [`dispatch`] — try guesses against converters in priority order
//! 4. [`postprocess`] — deterministic Markdown cleanup
//!
//! [`charset`] is shared by the text-based converters.

pub mod charset;
pub mod dispatch;
pub mod input;
pub mod postprocess;
pub mod sniff;
pub mod substitute;
pub mod zip_probe;
