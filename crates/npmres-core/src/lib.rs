//! Core of the npm resource acceptance harness.
//!
//! The harness drives a CI resource (`check` / `in` / `out`) as a black box:
//! it builds a JSON request, spawns the resource locally or in a container,
//! captures its output, and asserts on stdout, on files written into the
//! scenario's scratch directory, and on the package registry.
//!
//! ```text
//! Feature file --parse--> Scenario { steps }
//!                              |
//!                              v
//! ScenarioExecutor --setup--> ScenarioContext (scratch dir, request)
//!     |                           |
//!     |   steps::execute ---------+--> request builders
//!     |                           +--> ResourceRunner::run (local | docker)
//!     |                           +--> PackageRegistry (npm CLI)
//!     |                           +--> assertions
//!     v
//! ScenarioOutcome / FeatureReport
//! ```

pub mod assertions;
pub mod config;
pub mod credentials;
pub mod executor;
pub mod feature;
pub mod registry;
pub mod request;
pub mod response;
pub mod runner;
pub mod scenario;
pub mod steps;

#[cfg(test)]
pub(crate) mod test_util;
