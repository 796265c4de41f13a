//! Error handling.
//!
//! Every fallible operation in capypdf returns a [`CapyResult`]. Argument errors are
//! reported by the call that introduces them, without modifying any state. Structural
//! errors, like unbalanced graphics states or a document without pages, can only be
//! detected once a scope closes or the document is written, and are reported there.

use thiserror::Error;

/// A wrapper type for capypdf errors.
pub type CapyResult<T> = Result<T, CapyError>;

/// An error in capypdf.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CapyError {
    /// A numeric or textual argument was out of range.
    #[error("{0}")]
    InvalidArgument(String),
    /// An object of the wrong kind was passed, or an operation was invoked
    /// on a draw context of the wrong kind.
    #[error("Type mismatch: expected {expected}, got {found}.")]
    TypeMismatch {
        /// What the operation expected.
        expected: &'static str,
        /// What it received.
        found: &'static str,
    },
    /// A handle that was not registered with this document.
    #[error("Unknown {kind} handle {index}.")]
    UnknownHandle {
        /// The kind of the handle.
        kind: &'static str,
        /// The index of the handle.
        index: u32,
    },
    /// A parent handle that was not registered with this document.
    #[error("Unknown parent {kind} {index}.")]
    UnknownParent {
        /// The kind of the parent.
        kind: &'static str,
        /// The index of the parent.
        index: u32,
    },
    /// A graphics state or marked content stack was popped below zero, or was
    /// not empty when the draw context was registered.
    #[error("{0}")]
    UnbalancedState(String),
    /// A color had a different number of components than its colorspace.
    #[error("Incorrect color channel count: expected {expected}, got {found}.")]
    ColorComponentMismatch {
        /// The number of components the colorspace has.
        expected: usize,
        /// The number of components that were provided.
        found: usize,
    },
    /// Two objects that need to share a colorspace do not.
    #[error("Colorspace mismatch: {0}")]
    ColorSpaceMismatch(String),
    /// The document was written without any pages.
    #[error("No pages defined.")]
    NoPagesDefined,
    /// A destination points to a page that does not exist when the document is written.
    #[error("Destination refers to page {page}, but the document only has {page_count} pages.")]
    UnresolvedDestination {
        /// The requested page index.
        page: usize,
        /// The number of pages in the document.
        page_count: usize,
    },
    /// A name that must be unique was registered twice.
    #[error("Duplicate name {0:?}.")]
    DuplicateName(String),
    /// A structure item was used for more than one marked content sequence.
    #[error("Structure item {0} is already used.")]
    StructureReuse(u32),
    /// An outline was added without a title.
    #[error("Outline title must not be empty.")]
    EmptyTitle,
    /// A font could not be loaded or embedded.
    #[error("Font error: {0}")]
    Font(String),
    /// An image could not be decoded.
    #[error("Image error: {0}")]
    Image(String),
    /// An ICC profile could not be parsed.
    #[error("ICC profile error: {0}")]
    IccProfile(String),
    /// Reading an input file failed.
    #[error("I/O error: {0}")]
    Io(String),
    /// Encoding or writing the final document failed.
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),
}

impl CapyError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn unbalanced(message: impl Into<String>) -> Self {
        Self::UnbalancedState(message.into())
    }
}

impl From<std::io::Error> for CapyError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_the_original_wording() {
        assert_eq!(
            CapyError::invalid("Negative line width.").to_string(),
            "Negative line width."
        );
        assert_eq!(CapyError::NoPagesDefined.to_string(), "No pages defined.");
    }

    #[test]
    fn io_errors_are_converted() {
        let err: CapyError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err, CapyError::Io("gone".to_string()));
    }
}
