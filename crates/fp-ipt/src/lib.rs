pub mod executor;
pub mod status;

pub use executor::*;
pub use status::*;
