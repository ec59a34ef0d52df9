//! Message framing.
//!
//! Every message is a JSON document prefixed by its length as a 4-byte
//! big-endian integer. The JSON itself never contains a newline.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::DaemonResult;

/// Largest frame either side accepts.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

pub fn framed<T: AsyncRead + AsyncWrite>(io: T) -> Framed<T, LengthDelimitedCodec> {
    let codec = LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec();
    Framed::new(io, codec)
}

pub fn encode<T: Serialize>(value: &T) -> DaemonResult<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> DaemonResult<T> {
    Ok(serde_json::from_slice(frame)?)
}
