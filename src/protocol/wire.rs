//! Little-endian read/write primitives shared by every message type.
//! All multi-byte integers in the wire protocol are little-endian.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::protocol::{CString, Document, MsgHeader};

/// Size of the fixed message header.
pub const HEADER_LEN: i32 = 16;

/// Fill `buf` completely. EOF before the first byte is `EndOfStream` (a clean
/// boundary); EOF after any byte is `Truncated`.
pub(crate) async fn read_full<R>(r: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(if filled == 0 {
                Error::EndOfStream
            } else {
                Error::Truncated
            });
        }
        filled += n;
    }
    Ok(())
}

/// Reclassify a boundary EOF once part of a frame has already been consumed.
pub(crate) fn mid_frame(e: Error) -> Error {
    match e {
        Error::EndOfStream => Error::Truncated,
        other => other,
    }
}

/// A zero-progress write surfaces as `ShortWrite`.
pub(crate) fn write_error(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::WriteZero {
        Error::ShortWrite
    } else {
        Error::Io(e)
    }
}

pub(crate) async fn write_full<W>(w: &mut W, buf: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    w.write_all(buf).await.map_err(write_error)
}

pub async fn read_i32<R>(r: &mut R) -> Result<i32>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = [0u8; 4];
    read_full(r, &mut buf).await?;
    Ok(i32::from_le_bytes(buf))
}

pub async fn read_i64<R>(r: &mut R) -> Result<i64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = [0u8; 8];
    read_full(r, &mut buf).await?;
    Ok(i64::from_le_bytes(buf))
}

pub async fn write_i32<W>(w: &mut W, v: i32) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    write_full(w, &v.to_le_bytes()).await
}

pub async fn write_i64<W>(w: &mut W, v: i64) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    write_full(w, &v.to_le_bytes()).await
}

/// Read a NUL-terminated string. The returned buffer includes the trailing
/// NUL; bytes after it are left in the reader.
pub async fn read_cstring<R>(r: &mut R) -> Result<CString>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match read_full(r, &mut byte).await {
            Ok(()) => {}
            Err(e) if buf.is_empty() => return Err(e),
            Err(e) => return Err(mid_frame(e)),
        }
        buf.push(byte[0]);
        if byte[0] == 0 {
            return Ok(CString::from_bytes(buf));
        }
    }
}

/// Read one BSON document: a leading little-endian i32 total size (including
/// the 4 size bytes themselves), then `size - 4` opaque bytes. The returned
/// blob includes the size prefix.
///
/// EOF at the document boundary is `EndOfStream`, which callers at optional
/// positions treat as "absent". Anything shorter than a started document is
/// `Truncated`.
pub async fn read_document<R>(r: &mut R) -> Result<Document>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut size_raw = [0u8; 4];
    read_full(r, &mut size_raw).await?;
    let size = i32::from_le_bytes(size_raw);
    if size < 5 {
        return Err(Error::Truncated);
    }

    let mut blob = vec![0u8; size as usize];
    blob[..4].copy_from_slice(&size_raw);
    read_full(r, &mut blob[4..]).await.map_err(mid_frame)?;
    Ok(Document::from_bytes(blob))
}

/// Copy one complete frame from `src` to `dst` without interpreting the body:
/// decode and re-emit the header, then stream exactly `message_length - 16`
/// bytes.
pub async fn copy_message<R, W>(src: &mut R, dst: &mut W) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let h = MsgHeader::read_from(src).await?;
    h.write_to(dst).await?;

    let body_len = (h.message_length - HEADER_LEN) as u64;
    if body_len == 0 {
        return Ok(());
    }

    let mut body = AsyncReadExt::take(&mut *src, body_len);
    let copied = tokio::io::copy(&mut body, dst).await.map_err(write_error)?;
    if copied < body_len {
        return Err(Error::Truncated);
    }
    Ok(())
}
