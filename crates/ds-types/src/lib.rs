pub mod candidate;
pub mod errors;
pub mod evaluator;
pub mod gaussian;
pub mod model;
pub mod space;

pub use candidate::*;
pub use errors::*;
pub use evaluator::*;
pub use gaussian::*;
pub use model::*;
pub use space::*;
