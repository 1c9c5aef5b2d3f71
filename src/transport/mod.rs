//! Binary socket transport.
//!
//! Receives images as length-prefixed frames over plain TCP and feeds them
//! to the image processor one at a time. There is no reply frame: a client
//! learns about failures only from the connection closing.

pub mod frame;
pub mod socket;

pub use socket::{send_image, SocketServer};

use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Socket I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed after {0} of 8 header bytes")]
    TruncatedHeader(usize),

    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: u64, max: u64 },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}
