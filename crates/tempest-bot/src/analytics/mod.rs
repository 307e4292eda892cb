//! Analytics: daily rollups and the public delayed read model.

pub mod public;
pub mod rollups;

pub use public::{project, PublicReadModel};
pub use rollups::{city_rollups, equity_point, strategy_rollups, Rollups};
