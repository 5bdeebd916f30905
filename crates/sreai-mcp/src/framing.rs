//! `Content-Length` framing for MCP stdio messages.
//!
//! Each message is a header block (`Content-Length: N`, optionally other
//! headers) terminated by a blank line, followed by exactly N body bytes.

use crate::error::McpError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Longest header line accepted, including the line terminator.
const MAX_HEADER_LINE: u64 = 8 * 1024;

/// Largest body accepted in a single frame.
pub const MAX_FRAME_BYTES: usize = 32 * 1024 * 1024;

/// Read one framed message body.
///
/// Returns `Ok(None)` on a clean end of stream before any header byte.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, McpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut seen_header = false;
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = (&mut *reader)
            .take(MAX_HEADER_LINE)
            .read_until(b'\n', &mut line)
            .await?;
        if n == 0 {
            if seen_header {
                return Err(McpError::Protocol(
                    "unexpected end of stream in frame header".into(),
                ));
            }
            return Ok(None);
        }
        if line.last() != Some(&b'\n') {
            if n as u64 >= MAX_HEADER_LINE {
                return Err(McpError::Protocol("frame header line too long".into()));
            }
            return Err(McpError::Protocol(
                "unexpected end of stream in frame header".into(),
            ));
        }

        let text = String::from_utf8_lossy(&line);
        let text = text.trim();
        if text.is_empty() {
            if !seen_header {
                continue;
            }
            break;
        }
        seen_header = true;

        if let Some((name, value)) = text.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                let length: usize = value.trim().parse().map_err(|_| {
                    McpError::Protocol(format!("invalid content-length header: {text}"))
                })?;
                content_length = Some(length);
            }
        }
    }

    let length = content_length
        .ok_or_else(|| McpError::Protocol("missing Content-Length header".into()))?;
    if length > MAX_FRAME_BYTES {
        return Err(McpError::Protocol(format!(
            "frame of {length} bytes exceeds limit of {MAX_FRAME_BYTES}"
        )));
    }

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            McpError::Protocol("unexpected end of stream in frame body".into())
        } else {
            McpError::Io(e)
        }
    })?;
    Ok(Some(body))
}

/// Write one framed message and flush.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), McpError>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}
