pub mod error;
pub mod io;

pub use error::{DiscusError, DiscusResult};
pub use io::{ReadAt, WriteAt};
