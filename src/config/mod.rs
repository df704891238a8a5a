//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → Config (validated)
//!     → options.rs (Options::from_config, programmatic overrides)
//!     → Options::build → Parameters (immutable) + Supervisor
//! ```
//!
//! # Design Decisions
//! - Parameters are immutable once built
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod options;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use options::{Options, Parameters};
pub use schema::Config;
pub use validation::ValidationError;
