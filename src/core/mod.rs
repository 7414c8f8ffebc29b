pub mod logger;
pub mod theme;
pub mod utils;

pub use theme::*;
pub use utils::*;
