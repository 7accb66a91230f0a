//! Typed wires connecting schedulers.

pub mod input;
pub mod output;
pub mod solder;

pub use input::InputWire;
pub use output::OutputWire;
pub use solder::SolderType;
