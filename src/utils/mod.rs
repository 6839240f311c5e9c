pub mod collections;
pub mod constants;
pub mod io;
pub mod time;

pub use collections::*;
pub use constants::*;
pub use io::*;
pub use time::*;
