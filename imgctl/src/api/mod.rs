//! HTTP API: handlers, request/response models and extractors.
//!
//! - **Generation** (`/generate_and_upload`, `/generate_image`): prompt in, image out
//! - **Prompt records** (`/get_saved_prompts`, `/get_prompt/{id}`): read-only view of saved prompts
//! - **User images** (`/api/user_images/{user_uid}`): images stored under a user's folder
//! - **Static assets** (`/`, `/static/*`): the bundled web page
//!
//! The OpenAPI document is served at `/api-docs/openapi.json` with a browsable version at `/docs`.

pub mod extract;
pub mod handlers;
pub mod models;
