//! Data shapes for the tool-call resource and its sub-documents.

pub mod elicitation;
pub mod sampling;
pub mod tool_call;
