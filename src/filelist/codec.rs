//! Compression transport for file lists
//!
//! The compression format is picked from the file extension: `.bz2` is the
//! usual `files.xml.bz2`, `.zst` uses zstd, anything else is plain XML.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Zstd level used for file lists
const ZSTD_LEVEL: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Bzip2,
    Zstd,
}

impl Compression {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("bz2") => Compression::Bzip2,
            Some(ext) if ext.eq_ignore_ascii_case("zst") => Compression::Zstd,
            _ => Compression::None,
        }
    }
}

/// Writer that compresses on the way out. Call [`CompressedWriter::finish`]
/// to flush the compressor trailer; dropping it may lose buffered output.
pub enum CompressedWriter<W: Write> {
    Plain(W),
    Bzip2(bzip2::write::BzEncoder<W>),
    Zstd(zstd::Encoder<'static, W>),
}

impl<W: Write> CompressedWriter<W> {
    pub fn new(inner: W, compression: Compression) -> io::Result<Self> {
        Ok(match compression {
            Compression::None => CompressedWriter::Plain(inner),
            Compression::Bzip2 => CompressedWriter::Bzip2(bzip2::write::BzEncoder::new(
                inner,
                bzip2::Compression::best(),
            )),
            Compression::Zstd => CompressedWriter::Zstd(zstd::Encoder::new(inner, ZSTD_LEVEL)?),
        })
    }

    /// Write the compressor trailer and hand back the inner writer
    pub fn finish(self) -> io::Result<W> {
        match self {
            CompressedWriter::Plain(mut inner) => {
                inner.flush()?;
                Ok(inner)
            }
            CompressedWriter::Bzip2(encoder) => encoder.finish(),
            CompressedWriter::Zstd(encoder) => encoder.finish(),
        }
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CompressedWriter::Plain(inner) => inner.write(buf),
            CompressedWriter::Bzip2(encoder) => encoder.write(buf),
            CompressedWriter::Zstd(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CompressedWriter::Plain(inner) => inner.flush(),
            CompressedWriter::Bzip2(encoder) => encoder.flush(),
            CompressedWriter::Zstd(encoder) => encoder.flush(),
        }
    }
}

/// Create `path` for writing through `compression`. Callers writing to a
/// temp sibling pass the compression of the final destination.
pub fn create(
    path: &Path,
    compression: Compression,
) -> io::Result<CompressedWriter<BufWriter<File>>> {
    let file = File::create(path)?;
    CompressedWriter::new(BufWriter::new(file), compression)
}

/// Open `path` for reading, decompressing according to its extension.
/// Decompression failures surface as I/O errors from the returned reader.
pub fn open(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let file = BufReader::new(File::open(path)?);
    decompress(file, Compression::from_path(path))
}

pub fn decompress<R: BufRead + 'static>(
    input: R,
    compression: Compression,
) -> io::Result<Box<dyn BufRead>> {
    Ok(match compression {
        Compression::None => Box::new(input),
        Compression::Bzip2 => Box::new(BufReader::new(bzip2::bufread::BzDecoder::new(input))),
        Compression::Zstd => Box::new(BufReader::new(zstd::Decoder::with_buffer(input)?)),
    })
}
