//! Request and response bodies. Field names follow the JSON contract the bundled web page and
//! existing clients use, which is why casing is not uniform.

pub mod generation;
pub mod images;
pub mod prompts;
