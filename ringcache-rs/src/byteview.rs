//! Provides the immutable value container which is stored in the caches.
//!
//! A [ByteView] wraps an arbitrary sequence of bytes (strings, images, serialized objects...).
//! Internally it is backed by [Bytes](bytes::Bytes) so that handing a cached value to several
//! callers doesn't copy any data. Readers however never obtain a mutable handle to the cached
//! bytes: [ByteView::byte_slice] always hands out a copy.
use bytes::Bytes;
use std::fmt;
use std::fmt::Display;

use crate::lru::ByteSize;

/// Represents an immutable view on a cached value.
///
/// # Examples
/// ```
/// # use ringcache::byteview::ByteView;
/// let view = ByteView::from("630");
/// assert_eq!(view.len(), 3);
/// assert_eq!(view.byte_slice(), b"630".to_vec());
/// assert_eq!(view.to_string(), "630");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ByteView {
    data: Bytes,
}

impl ByteView {
    /// Creates a view which takes ownership of the given data.
    pub fn new(data: Vec<u8>) -> Self {
        ByteView {
            data: Bytes::from(data),
        }
    }

    /// Creates a view by copying the given slice.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        ByteView {
            data: Bytes::copy_from_slice(data),
        }
    }

    /// Returns the number of bytes in this view.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Determines if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a copy of the underlying bytes.
    ///
    /// The copy can be modified freely as the cached data itself remains untouched.
    ///
    /// # Examples
    /// ```
    /// # use ringcache::byteview::ByteView;
    /// let view = ByteView::from("Hello");
    /// let mut copy = view.byte_slice();
    /// copy[0] = b'J';
    ///
    /// assert_eq!(copy, b"Jello".to_vec());
    /// assert_eq!(view.to_string(), "Hello");
    /// ```
    pub fn byte_slice(&self) -> Vec<u8> {
        self.data.to_vec()
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(data: Vec<u8>) -> Self {
        ByteView::new(data)
    }
}

impl From<&str> for ByteView {
    fn from(data: &str) -> Self {
        ByteView::copy_from_slice(data.as_bytes())
    }
}

impl Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.data))
    }
}

impl ByteSize for ByteView {
    fn allocated_size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::byteview::ByteView;
    use crate::lru::ByteSize;

    #[test]
    fn copies_do_not_leak_into_the_view() {
        let source = vec![1u8, 2, 3];
        let view = ByteView::copy_from_slice(&source);

        let mut first = view.byte_slice();
        first.clear();

        assert_eq!(view.byte_slice(), vec![1u8, 2, 3]);
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn size_matches_the_payload() {
        assert_eq!(ByteView::from("World").allocated_size(), 5);
        assert_eq!(ByteView::default().allocated_size(), 0);
        assert!(ByteView::default().is_empty());
    }

    #[test]
    fn clones_share_the_same_contents() {
        let view = ByteView::new(b"589".to_vec());
        let clone = view.clone();

        assert_eq!(view, clone);
        assert_eq!(clone.to_string(), "589");
    }
}
