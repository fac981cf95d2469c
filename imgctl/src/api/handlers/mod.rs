//! Axum route handlers.
//!
//! - [`generation`]: prompt to image, optionally stored in the bucket
//! - [`prompts`]: saved prompt records
//! - [`images`]: images stored under a user's folder
//! - [`static_assets`]: the bundled web page
//!
//! Handlers receive their backends through [`crate::AppState`]. Storage and the prompt database are
//! optional there; each handler decides what their absence means for its response.

pub mod generation;
pub mod images;
pub mod prompts;
pub mod static_assets;
