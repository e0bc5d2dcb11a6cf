pub mod models;
pub mod options;
pub mod traits;

pub use models::*;
pub use options::*;
pub use traits::*;
