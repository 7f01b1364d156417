pub mod expression;
pub mod grammar;
pub mod statement;
pub mod trace;
pub mod value;

pub use expression::*;
pub use statement::*;
pub use trace::*;
pub use value::*;
