//! The prompt page (`index.html` plus its script and stylesheet), compiled into the binary.

use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "static/"]
pub(crate) struct PageAssets;
