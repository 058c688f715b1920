pub mod check_record;
pub mod spot;

pub use check_record::{CheckRecord, CheckStage};
pub use spot::{NewSpot, Occupancy, Spot, SpotPatch};
