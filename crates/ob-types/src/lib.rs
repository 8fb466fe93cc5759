pub mod errors;
pub mod parameter;
pub mod trial;

pub use errors::*;
pub use parameter::*;
pub use trial::*;
