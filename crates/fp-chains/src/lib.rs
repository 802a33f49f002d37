pub mod aggregate;
pub mod chain;
pub mod controller;
pub mod group;
pub mod jump;
pub mod reload;

pub use aggregate::*;
pub use chain::*;
pub use controller::*;
pub use group::*;
pub use jump::*;
pub use reload::*;
