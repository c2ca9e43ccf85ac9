pub mod acquire;
pub mod catalog;
pub mod probe;

// Re-export command functions for convenience
pub use acquire::{run, scan};
pub use catalog::{import, reset, resolve};
pub use probe::probe;
