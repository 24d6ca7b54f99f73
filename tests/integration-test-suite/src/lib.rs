//! End-to-end scenario tests for the tool-call service, driven through the
//! assembled router without a network listener.

pub mod helpers;

#[cfg(test)]
mod http_surface_tests;
#[cfg(test)]
mod tool_call_tests;
