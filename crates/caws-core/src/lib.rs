pub mod budget;
pub mod cache;
pub mod change;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod paths;
pub mod policy;
pub mod types;
pub mod waiver;
pub mod working_spec;

pub use engine::{BudgetDecision, LoadedPolicy, PolicyEngine, WaiverResolution};
pub use error::{CawsError, PolicyError, Result};
