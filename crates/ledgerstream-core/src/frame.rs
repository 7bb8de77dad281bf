//! Length-prefixed framing for the meta pipe and archive data files.
//!
//! Wire format: a 4-byte big-endian payload length followed by a bincode
//! payload, one record per frame. The reader distinguishes a clean EOF at a
//! frame boundary (end of stream) from an EOF mid-frame (truncation fault),
//! and rejects oversized length prefixes before allocating.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;

/// Frames larger than this are rejected before any allocation.
pub const MAX_FRAME_LEN: usize = 128 * 1024 * 1024;

const FRAME_HEADER_LEN: usize = 4;

/// Encode one record into a framed buffer.
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, FrameError> {
    let payload = bincode::serialize(value).map_err(|e| FrameError::Encode(e.to_string()))?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }
    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Write one framed record and flush.
pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let buf = encode_frame(value)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed record; `Ok(None)` on a clean EOF at a frame boundary.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    if reader.read(&mut header[..1]).await? == 0 {
        return Ok(None);
    }
    read_exact_or_truncated(reader, &mut header[1..]).await?;

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = vec![0u8; len];
    read_exact_or_truncated(reader, &mut payload).await?;
    bincode::deserialize(&payload)
        .map(Some)
        .map_err(|e| FrameError::Decode(e.to_string()))
}

async fn read_exact_or_truncated<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<(), FrameError> {
    reader.read_exact(buf).await.map(|_| ()).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::Truncated
        } else {
            FrameError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{LedgerCloseMeta, LedgerHash, LedgerHeader, LedgerHeaderEntry};

    fn meta(seq: u32) -> LedgerCloseMeta {
        LedgerCloseMeta {
            ledger_header: LedgerHeaderEntry {
                hash: LedgerHash([seq as u8; 32]),
                header: LedgerHeader {
                    ledger_seq: seq,
                    previous_ledger_hash: LedgerHash([seq.wrapping_sub(1) as u8; 32]),
                    bucket_list_hash: LedgerHash::ZERO,
                    close_time: 0,
                    base_fee: 100,
                    ledger_version: 20,
                },
            },
            tx_processing: vec![],
        }
    }

    #[tokio::test]
    async fn roundtrip_single_frame() {
        let buf = encode_frame(&meta(5)).unwrap();
        let mut reader = &buf[..];
        let decoded: Option<LedgerCloseMeta> = read_frame(&mut reader).await.unwrap();
        assert_eq!(decoded.unwrap(), meta(5));
    }

    #[tokio::test]
    async fn back_to_back_frames_then_clean_eof() {
        let mut buf = Vec::new();
        for seq in 2..=4 {
            buf.extend_from_slice(&encode_frame(&meta(seq)).unwrap());
        }
        let mut reader = &buf[..];
        for seq in 2..=4 {
            let decoded: Option<LedgerCloseMeta> = read_frame(&mut reader).await.unwrap();
            assert_eq!(decoded.unwrap().ledger_sequence(), seq);
        }
        let eof: Option<LedgerCloseMeta> = read_frame(&mut reader).await.unwrap();
        assert!(eof.is_none());
    }

    #[tokio::test]
    async fn truncated_payload_is_an_error() {
        let buf = encode_frame(&meta(5)).unwrap();
        let mut reader = &buf[..buf.len() - 3];
        let err = read_frame::<_, LedgerCloseMeta>(&mut reader)
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::Truncated));
    }

    #[tokio::test]
    async fn truncated_header_is_an_error() {
        let buf = [0u8, 0, 1];
        let mut reader = &buf[..];
        let err = read_frame::<_, LedgerCloseMeta>(&mut reader)
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::Truncated));
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(u32::MAX).to_be_bytes());
        buf.extend_from_slice(&[0u8; 16]);
        let mut reader = &buf[..];
        let err = read_frame::<_, LedgerCloseMeta>(&mut reader)
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn garbage_payload_is_a_decode_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&8u32.to_be_bytes());
        buf.extend_from_slice(&[0xff; 8]);
        let mut reader = &buf[..];
        let err = read_frame::<_, LedgerCloseMeta>(&mut reader)
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::Decode(_)));
    }
}
