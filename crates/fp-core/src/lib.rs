pub mod config;
pub mod error;
pub mod executor;
pub mod memory;
pub mod registry;
pub mod report;
pub mod rule;
pub mod table;

pub use config::*;
pub use error::FirewallError;
pub use executor::*;
pub use memory::*;
pub use registry::*;
pub use report::*;
pub use rule::*;
pub use table::*;
