//! HTTP route handlers

pub mod mocks;
pub mod relay;
pub mod serve;

#[cfg(test)]
mod tests;
