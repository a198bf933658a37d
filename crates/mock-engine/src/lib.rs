//! Mock Response Engine
//!
//! Turns a stored response template into a fresh JSON body per request.
//! Templates are JSON documents where:
//!
//! - a string containing `{{token}}` is filled from the [`PlaceholderTable`]
//!   (`{{uuid}}`, `{{timestamp}}`, `{{email}}`, ...), every occurrence
//!   independently;
//! - an object key ending in `{{xN}}` (e.g. `"items{{x5}}"`) expands its
//!   value into an array of `N` independently rendered copies.
//!
//! [`MockEngine`] wraps rendering with the per-endpoint auth check, rate
//! limit, simulated latency and usage accounting.

mod engine;
mod error;
mod placeholders;
mod template;

pub use engine::{MockEngine, MockResponse, RequestContext};
pub use error::{MockError, TemplateError};
pub use placeholders::{PlaceholderTable, Resolver};
pub use template::{Segment, Template, MAX_EXPANDED_NODES, MAX_REPEAT};
