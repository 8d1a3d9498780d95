mod outcome;
mod policy;
mod product;
mod transaction;

pub use outcome::*;
pub use policy::*;
pub use product::*;
pub use transaction::*;
