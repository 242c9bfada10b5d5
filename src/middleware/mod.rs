mod gzip;
mod log;
mod sign;

pub use gzip::{compress, decompress, gzip_middleware};
pub use log::logging_middleware;
pub use sign::{sign_hex, sign_middleware, SignState};
