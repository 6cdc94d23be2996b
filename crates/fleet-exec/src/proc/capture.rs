use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes read from one output stream, capped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// The stream produced more than the cap; the excess was drained and dropped.
    pub truncated: bool,
}

impl Captured {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty() && !self.truncated
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Read `reader` to EOF, keeping at most `limit` bytes.
pub(crate) async fn capture<R>(mut reader: R, limit: usize) -> std::io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut out = Captured::default();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(out);
        }
        let room = limit.saturating_sub(out.bytes.len());
        if n > room {
            out.bytes.extend_from_slice(&buf[..room]);
            out.truncated = true;
        } else {
            out.bytes.extend_from_slice(&buf[..n]);
        }
    }
}
