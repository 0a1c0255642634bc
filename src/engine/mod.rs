// Query dispatch, timing and presentation
pub mod catalog;
pub mod harness;
pub mod presenter;

pub use catalog::*;
pub use harness::*;
pub use presenter::*;
