//! 具体渠道实现

pub mod local_file;
pub mod pushover;

pub use local_file::LocalFileChannel;
pub use pushover::{PushoverChannel, PushoverConfig};
