//! Byte metering for pipes between pipeline stages.

use bytes::BytesMut;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Buffer size for one read from the producer (256KB)
pub const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Shared running total of bytes seen on a pipe.
#[derive(Debug, Clone, Default)]
pub struct Meter {
    total: Arc<AtomicU64>,
}

impl Meter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: u64) {
        self.total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Copy `reader` into `writer` unchanged, adding every byte to `meter`.
///
/// The writer is shut down and dropped at EOF so the next stage sees end of input.
pub async fn copy_metered<R, W>(mut reader: R, mut writer: W, meter: Meter) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(COPY_BUFFER_SIZE);
    let mut copied = 0u64;

    loop {
        buf.clear();
        let n = reader.read_buf(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        meter.add(n as u64);
        copied += n as u64;
    }

    writer.flush().await?;
    writer.shutdown().await?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_counts_without_altering() {
        let input: Vec<u8> = (0..(COPY_BUFFER_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let mut output = Vec::new();
        let meter = Meter::new();

        let copied = copy_metered(&input[..], &mut output, meter.clone())
            .await
            .unwrap();

        assert_eq!(copied, input.len() as u64);
        assert_eq!(meter.total(), input.len() as u64);
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn test_meter_shared_between_clones() {
        let meter = Meter::new();
        let other = meter.clone();
        meter.add(10);
        other.add(5);
        assert_eq!(meter.total(), 15);
    }
}
