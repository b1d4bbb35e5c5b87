//! Contains the wire format used between peers.
//!
//! A peer requests a value via `GET <peer><base-path><namespace>/<key>` where both, the
//! namespace and the key are percent-escaped. The response body is a tiny protobuf compatible
//! message which carries the value as field 1 (length delimited). Therefore peers which use
//! a regular protobuf library to read or write a message like
//!
//! ```text
//! message Response {
//!     bytes value = 1;
//! }
//! ```
//!
//! can take part in a cluster as well.
//!
//! # Examples
//! ```
//! # use ringcache::wire::{decode_value, encode_value, parse_path, peer_url, PeerPath};
//! let url = peer_url("http://node-a:8001/_ringcache/", "scores", "Tom Jones");
//! assert_eq!(url, "http://node-a:8001/_ringcache/scores/Tom%20Jones");
//!
//! assert_eq!(
//!     parse_path("/_ringcache/", "/_ringcache/scores/Tom%20Jones"),
//!     PeerPath::Entry("scores".to_owned(), "Tom Jones".to_owned())
//! );
//!
//! let body = encode_value(b"630");
//! assert_eq!(&body[..], &[0x0A, 3, b'6', b'3', b'0']);
//! assert_eq!(decode_value(&body).unwrap(), b"630");
//! ```
use anyhow::Context;
use bytes::Bytes;
use prost::Message;

/// Represents the message sent in response to a peer request.
#[derive(Clone, PartialEq, Message)]
struct ValueResponse {
    #[prost(bytes = "vec", tag = "1")]
    value: Vec<u8>,
}

/// Encodes the given value into a response message.
///
/// Just like protobuf does for an empty bytes field, an empty value yields an empty message.
pub fn encode_value(value: &[u8]) -> Bytes {
    Bytes::from(
        ValueResponse {
            value: value.to_vec(),
        }
        .encode_to_vec(),
    )
}

/// Decodes the value from a response message.
///
/// Unknown fields are skipped. If the value field occurs several times, the last one wins.
/// A message without a value field yields an empty value.
pub fn decode_value(data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let response = ValueResponse::decode(data).context("Failed to decode response message.")?;

    Ok(response.value)
}

/// Builds the URL used to fetch a key of a namespace from a peer.
///
/// The **base_url** is the address of the peer followed by the base path, e.g.
/// `http://node-a:8001/_ringcache/`.
pub fn peer_url(base_url: &str, namespace: &str, key: &str) -> String {
    format!(
        "{}{}/{}",
        base_url,
        urlencoding::encode(namespace),
        urlencoding::encode(key)
    )
}

/// Represents the outcome of parsing the path of a peer request.
#[derive(Debug, PartialEq, Eq)]
pub enum PeerPath {
    /// The path doesn't start with the base path and is none of our business.
    Foreign,

    /// Either the namespace or the key is missing, empty or not properly escaped.
    Malformed,

    /// A request for the given key (second) in the given namespace (first).
    Entry(String, String),
}

/// Parses the path of an incoming peer request.
///
/// # Examples
/// ```
/// # use ringcache::wire::{parse_path, PeerPath};
/// assert_eq!(parse_path("/_ringcache/", "/favicon.ico"), PeerPath::Foreign);
/// assert_eq!(parse_path("/_ringcache/", "/_ringcache/scores"), PeerPath::Malformed);
/// assert_eq!(parse_path("/_ringcache/", "/_ringcache/scores/"), PeerPath::Malformed);
/// assert_eq!(parse_path("/_ringcache/", "/_ringcache//Tom"), PeerPath::Malformed);
///
/// // Only the first slash separates the namespace from the key...
/// assert_eq!(
///     parse_path("/_ringcache/", "/_ringcache/scores/a/b"),
///     PeerPath::Entry("scores".to_owned(), "a/b".to_owned())
/// );
/// ```
pub fn parse_path(base_path: &str, path: &str) -> PeerPath {
    let rest = match path.strip_prefix(base_path) {
        Some(rest) => rest,
        None => return PeerPath::Foreign,
    };

    let (namespace, key) = match rest.split_once('/') {
        Some(parts) => parts,
        None => return PeerPath::Malformed,
    };

    match (urlencoding::decode(namespace), urlencoding::decode(key)) {
        (Ok(namespace), Ok(key)) if !namespace.is_empty() && !key.is_empty() => {
            PeerPath::Entry(namespace.into_owned(), key.into_owned())
        }
        _ => PeerPath::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use crate::wire::{decode_value, encode_value, parse_path, peer_url, PeerPath};

    #[test]
    fn empty_values_are_encoded_as_empty_message() {
        assert!(encode_value(b"").is_empty());
        assert_eq!(decode_value(b"").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn large_values_use_multi_byte_lengths() {
        let value = vec![42u8; 300];
        let body = encode_value(&value);

        assert_eq!(body.len(), 303);
        assert_eq!(decode_value(&body).unwrap(), value);
    }

    #[test]
    fn unknown_fields_are_skipped() {
        let mut body = vec![0x10, 0x96, 0x01]; // field 2, varint 150
        body.extend_from_slice(&encode_value(b"Tom"));

        assert_eq!(decode_value(&body).unwrap(), b"Tom");
    }

    #[test]
    fn broken_messages_are_rejected() {
        // Length exceeds the message...
        assert!(decode_value(&[0x0A, 0x05, b'a']).is_err());
        // Incomplete varint...
        assert!(decode_value(&[0x0A, 0x80]).is_err());
        // The value field must be length delimited...
        assert!(decode_value(&[0x08, 0x01]).is_err());
    }

    #[test]
    fn urls_and_paths_agree() {
        let namespace = "hot scores";
        let key = "Tom/Jack?&%";
        let url = peer_url("http://localhost:8001/_ringcache/", namespace, key);
        let path = url.strip_prefix("http://localhost:8001").unwrap();

        assert_eq!(
            parse_path("/_ringcache/", path),
            PeerPath::Entry(namespace.to_owned(), key.to_owned())
        );
    }

    #[test]
    fn invalid_escapes_are_malformed() {
        // %FF is no valid UTF-8...
        assert_eq!(
            parse_path("/_ringcache/", "/_ringcache/scores/%FF"),
            PeerPath::Malformed
        );
    }
}
