//! Error types for zenavif-grid

use crate::engine::Status;

/// Error type for encode, decode and probe operations
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An encoder option is outside its allowed range
    #[error("{option} must be between {min} and {max}, got {value}")]
    InvalidOption {
        /// Name of the offending option
        option: &'static str,
        /// Value that was supplied
        value: u32,
        /// Inclusive lower bound
        min: u32,
        /// Inclusive upper bound
        max: u32,
    },

    /// Width or height is zero
    #[error("invalid image dimensions: {width}x{height}")]
    InvalidDimensions {
        /// Image width
        width: u32,
        /// Image height
        height: u32,
    },

    /// Pixel buffer does not match the declared geometry
    #[error("invalid pixel buffer: {0}")]
    InvalidBuffer(&'static str),

    /// Compressed input was empty
    #[error("cannot decode empty data")]
    EmptyInput,

    /// Interleaved/planar color transform failed in the engine
    #[error("color conversion failed: {0}")]
    Conversion(Status),

    /// A single tile could not be extracted or converted
    #[error("failed to build tile ({column},{row}): {source}")]
    TileBuild {
        /// Tile column
        column: u32,
        /// Tile row
        row: u32,
        /// Underlying failure
        #[source]
        source: Box<Error>,
    },

    /// Grid assembly was rejected by the engine
    #[error("failed to add image grid: {0}")]
    EncodeAssembly(Status),

    /// Finalizing the encoded stream failed
    #[error("failed to finish encoding: {0}")]
    EncodeFinish(Status),

    /// Container parsing failed
    #[error("failed to parse AVIF container: {0}")]
    DecodeParse(Status),

    /// Image decoding failed
    #[error("failed to decode AVIF image: {0}")]
    DecodeImage(Status),

    /// The engine or the allocator could not provide a buffer
    #[error("failed to allocate {0}")]
    Allocation(&'static str),

    /// Image dimensions exceed configured limit
    #[error("image too large: {width}x{height}")]
    ImageTooLarge {
        /// Image width
        width: u32,
        /// Image height
        height: u32,
    },

    /// Reader or writer failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Engine status attached to this error, if any
    ///
    /// Tile build failures report the status of their underlying cause.
    pub fn status(&self) -> Option<Status> {
        match self {
            Error::Conversion(s)
            | Error::EncodeAssembly(s)
            | Error::EncodeFinish(s)
            | Error::DecodeParse(s)
            | Error::DecodeImage(s) => Some(*s),
            Error::TileBuild { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Result type for zenavif-grid operations
pub type Result<T, E = Error> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_names_the_field() {
        let err = Error::InvalidOption {
            option: "speed",
            value: 11,
            min: 0,
            max: 10,
        };
        assert_eq!(err.to_string(), "speed must be between 0 and 10, got 11");
    }

    #[test]
    fn tile_error_reports_coordinates_and_cause() {
        let err = Error::TileBuild {
            column: 1,
            row: 2,
            source: Box::new(Error::Conversion(Status::ReformatFailed)),
        };
        let msg = err.to_string();
        assert!(msg.contains("(1,2)"), "{msg}");
        assert!(msg.contains(Status::ReformatFailed.as_str()), "{msg}");
        assert_eq!(err.status(), Some(Status::ReformatFailed));
    }
}
