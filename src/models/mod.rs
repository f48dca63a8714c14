pub mod analysis;
pub mod comparison;
pub mod evaluation;
pub mod trace;

pub use analysis::*;
pub use comparison::*;
pub use evaluation::*;
pub use trace::*;
