//! Pipeline stages for turning uploads into a CMA report.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and swapped without touching its neighbours.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ encode ──▶ llm ──▶ postprocess ──▶ layout ──▶ docx
//! (files)   (base64)  (model)  (fences/JSON)   (blocks)   (bytes)
//! ```
//!
//! 1. [`input`]  — validate uploads (count, size), name and type them
//! 2. [`encode`] — base64-wrap each file with its media type
//! 3. [`llm`]    — the only stage with network I/O; timeout and retry live here
//! 4. [`postprocess`] — strip code fences, parse the JSON object
//! 5. [`layout`] — decide sections, lines and cells from the record
//!    (number formatting in [`format`])
//! 6. [`docx`]   — page setup, styles and packaging

pub mod docx;
pub mod encode;
pub mod format;
pub mod input;
pub mod layout;
pub mod llm;
pub mod postprocess;
