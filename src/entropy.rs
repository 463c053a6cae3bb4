//! Decompression of the single WOFF2 payload stream
//!
//! The payload is one brotli stream holding every table back to back. The
//! actual decompression is delegated to a [`Decompressor`] so that callers can
//! plug in their own brotli implementation.

use std::error::Error;

use crate::directory::TableDirectory;
use crate::error::{ErrorKind, Result, bail_if, bail_with_msg_if};
use crate::options::Limits;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// A byte oriented decompression primitive.
///
/// `declared_size` is the size the output is expected to have. It may be used
/// as an allocation hint; implementations should not rely on it being honest.
pub trait Decompressor {
    fn decompress(&mut self, compressed: &[u8], declared_size: usize) -> Result<Vec<u8>, BoxError>;
}

impl<F> Decompressor for F
where
    F: FnMut(&[u8], usize) -> Result<Vec<u8>, BoxError>,
{
    fn decompress(&mut self, compressed: &[u8], declared_size: usize) -> Result<Vec<u8>, BoxError> {
        self(compressed, declared_size)
    }
}

/// Decompressor backed by the `brotli-decompressor` crate
#[cfg(feature = "brotli")]
#[derive(Debug, Default, Clone, Copy)]
pub struct BrotliDecompressor;

#[cfg(feature = "brotli")]
impl Decompressor for BrotliDecompressor {
    fn decompress(&mut self, compressed: &[u8], declared_size: usize) -> Result<Vec<u8>, BoxError> {
        use std::io::Write;

        let mut output: Vec<u8> = Vec::with_capacity(declared_size);
        let mut decompressor = brotli_decompressor::DecompressorWriter::new(&mut output, 4096);
        decompressor.write_all(compressed)?;
        decompressor.close()?;
        drop(decompressor);
        Ok(output)
    }
}

/// Check that the declared decompressed size is plausible before allocating for it.
pub(crate) fn check_declared_size(declared_size: usize, input_len: usize, limits: &Limits) -> Result<()> {
    bail_if!(declared_size < 1, ErrorKind::IntegrityCheckFailed);
    bail_with_msg_if!(
        declared_size > limits.max_decompressed_size,
        ErrorKind::LimitExceeded,
        "declared decompressed size {declared_size} exceeds the limit of {}",
        limits.max_decompressed_size
    );

    let compression_ratio: f32 = declared_size as f32 / input_len as f32;
    bail_with_msg_if!(
        compression_ratio > limits.max_compression_ratio,
        ErrorKind::LimitExceeded,
        "Implausible compression ratio {:.1}",
        compression_ratio
    );
    Ok(())
}

/// Decompress the payload, which must expand to exactly `declared_size` bytes.
pub(crate) fn decompress_stream(
    compressed: &[u8],
    declared_size: usize,
    decompressor: &mut dyn Decompressor,
) -> Result<Vec<u8>> {
    let decompressed = match decompressor.decompress(compressed, declared_size) {
        Ok(decompressed) => decompressed,
        Err(err) => {
            log::debug!("decompressing the table stream failed: {err}");
            return Err(ErrorKind::BrotliDecodingFailed.into());
        }
    };

    bail_with_msg_if!(
        decompressed.len() != declared_size,
        ErrorKind::BrotliDecodingFailed,
        "stream decompressed to {} bytes, expected {}",
        decompressed.len(),
        declared_size
    );
    Ok(decompressed)
}

/// Slice the decompressed stream into one slice per directory entry.
///
/// The tables must cover the stream exactly: back to back, in directory order,
/// with nothing left over.
pub(crate) fn partition<'a>(stream: &'a [u8], tables: &TableDirectory) -> Result<Vec<&'a [u8]>> {
    bail_with_msg_if!(
        stream.len() != tables.uncompressed_size,
        ErrorKind::IntegrityCheckFailed,
        "stream holds {} bytes, tables need {}",
        stream.len(),
        tables.uncompressed_size
    );
    tables.iter().map(|table| table.data(stream)).collect()
}
