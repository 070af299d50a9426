//! Domain models for the clinic visit workflow.

mod invoice;
mod staff;
mod stage;
mod visit;

pub use invoice::*;
pub use staff::*;
pub use stage::*;
pub use visit::*;
