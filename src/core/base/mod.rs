pub mod error;
pub mod outcome;
pub mod request;

pub use error::*;
pub use outcome::*;
pub use request::*;
