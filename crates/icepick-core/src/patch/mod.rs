mod descriptor;
mod operation;
mod orchestrator;

pub use descriptor::*;
pub use operation::*;
pub use orchestrator::*;
