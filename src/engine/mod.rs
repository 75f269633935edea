pub mod locks;
pub mod relay;

pub use relay::{EventRelay, LocationOutcome};
