// ai
//! 📖 ObjectReader — open one stored object, hand back something you can `read()`.
//!
//! 🎬 *[a key ends in `.gz`. the body arrives compressed. nobody downstream is told.]*
//!
//! The store returns a raw body. If the key says it is gzip (the `.gz` suffix, same
//! convention everybody with a log shipper has been using since 2009), the body is
//! wrapped in a multi-member gzip decoder, so concatenated gzip streams inflate fully.
//!
//! The decoder OWNS the body it wraps. Dropping an [`ObjectStream`] drops the decoder,
//! which drops the body, which closes the network stream. One drop, whole chain.
//! No separate closer to remember, no leaked connection to find at 3am. 🦆

use std::io::{self, Read};

use anyhow::Result;
use flate2::read::MultiGzDecoder;

use crate::backends::ObjectStore;

/// 🗜️ The suffix that means "inflate me first".
const GZIP_SUFFIX: &str = ".gz";

/// 🧵 A raw object body as the store hands it over: blocking, owned, sendable.
pub type ObjectBody = Box<dyn Read + Send>;

/// 📖 A readable object body, inflated if it needed to be.
pub enum ObjectStream {
    Plain(ObjectBody),
    Gzip(MultiGzDecoder<ObjectBody>),
}

impl ObjectStream {
    /// 🎁 Wrap a body according to its key's naming convention.
    pub fn for_key(key: &str, body: ObjectBody) -> Self {
        if is_compressed(key) {
            ObjectStream::Gzip(MultiGzDecoder::new(body))
        } else {
            ObjectStream::Plain(body)
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, ObjectStream::Gzip(_))
    }
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 trait-object bodies have no Debug, so we describe the wrapping instead
        match self {
            ObjectStream::Plain(_) => f.write_str("ObjectStream::Plain"),
            ObjectStream::Gzip(_) => f.write_str("ObjectStream::Gzip"),
        }
    }
}

impl Read for ObjectStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ObjectStream::Plain(body) => body.read(buf),
            ObjectStream::Gzip(decoder) => decoder.read(buf),
        }
    }
}

pub fn is_compressed(key: &str) -> bool {
    key.ends_with(GZIP_SUFFIX)
}

/// 🚪 Open `bucket/key` for streaming read. The caller owns the stream and closes it by dropping it.
pub async fn open<S>(store: &S, bucket: &str, key: &str) -> Result<ObjectStream>
where
    S: ObjectStore + ?Sized,
{
    let body = store.get_object(bucket, key).await?;
    Ok(ObjectStream::for_key(key, body))
}
