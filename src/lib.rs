//! Hacker Stories Scenario Harness
//!
//! End-to-end scenarios for the "Hacker Stories" search page, run against a
//! headless page model whose network calls go through an intercept layer.
//!
//! # Features
//!
//! - **Intercepts**: Match requests by method, pathname glob, URL glob or query
//!   parameters; the first registered rule wins
//! - **Aliases and waits**: Block until the next exchange of a named rule
//! - **Stubbed replies**: Answer from fixtures, static or templated bodies
//! - **Failure Injection**: Force HTTP errors, network errors and latency
//! - **Retrying assertions**: Element queries retry until they pass or time out
//! - **Scripts**: Declarative YAML scenarios next to the built-in catalogue
//!
//! # Example Configuration
//!
//! ```yaml
//! base_url: http://localhost:3000
//! timeouts:
//!   request_timeout_ms: 5000
//! scripts:
//!   - name: shows the footer
//!     steps:
//!       - action: visit
//!       - action: assert
//!         selector: footer
//!         visible: true
//! ```

pub mod backend;
pub mod config;
pub mod dom;
pub mod error;
pub mod fixtures;
pub mod matcher;
pub mod network;
pub mod page;
pub mod scenario;
pub mod script;
pub mod session;
pub mod stories;
pub mod suite;
pub mod template;

pub use backend::{Backend, SyntheticBackend};
pub use config::{HarnessConfig, InterceptDefinition};
pub use error::{HarnessError, HarnessResult};
pub use fixtures::Fixtures;
pub use network::{Exchange, Network, RequestDescriptor};
pub use scenario::{Group, Scenario, ScenarioRunner, SuiteReport};
pub use script::ScenarioScript;
pub use session::Session;
