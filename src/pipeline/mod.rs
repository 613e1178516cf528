//! Pipeline stages for essay review.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and the hosted-model seams stay narrow.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──▶ encode ──▶ llm ──▶ postprocess
//! (path/URL)  (stitch /    (staged    (vision,  (fence and
//!             extract)     PNG file)  text)     markdown cleanup)
//! ```
//!
//! 1. [`input`]: read local files or download URLs into `RawUpload`s
//! 2. [`normalize`]: stitch + downscale images, or extract document text;
//!    CPU-bound, run in `spawn_blocking`
//! 3. [`encode`]: PNG-encode the canonical image into a scoped temp file
//! 4. [`llm`]: the only stage with model I/O; no automatic retries
//! 5. [`postprocess`]: deterministic cleanup of model output and Markdown

pub mod encode;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod postprocess;
