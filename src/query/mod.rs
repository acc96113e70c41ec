//! Query translation and response shaping.
//!
//! `builder` turns an editor query into a [`builder::BackendRequest`];
//! `shaper` flattens the backend's nested result into [`crate::models::Frame`]s.

pub mod builder;
pub mod shaper;

pub use builder::{build_request, BackendRequest};
pub use shaper::shape_response;
