//! vprov-rest: reconciliation backend for appliance HTTP/JSON APIs.
//!
//! [`RestResource`] implements the engine's probe and action traits for a
//! resource collection; [`HttpReadiness`] and [`RemoteTask`] cover the two
//! asynchronous cases appliances exhibit: an API that only starts answering
//! some minutes after deployment, and operations tracked as tasks.

pub mod client;
pub mod config;
pub mod readiness;
pub mod resource;

pub use client::{RestClient, RestError, RestResponse};
pub use config::RestConfig;
pub use readiness::{HttpReadiness, RemoteTask};
pub use resource::{ResourcePath, RestResource};

pub use reqwest::Url;
