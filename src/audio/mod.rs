//! Raw PCM streaming for the CLI frontend.
//!
//! Mono `f32` little-endian samples are read from a byte stream, pushed
//! through a [`PortProcessor`] and written back in the same format.

use std::io::{self, Read, Write};

use tracing::{info, warn};

use crate::error::{PhsError, Result};
use crate::processor::PortProcessor;

/// Samples per processing block.
pub const BUFFER_SIZE: usize = 256;

const SAMPLE_BYTES: usize = 4;

/// Block reader of `f32le` samples.
pub struct AudioInput<R> {
    reader: R,
    buffer: Vec<u8>,
    /// Bytes of an incomplete sample left over from the previous read
    pending: usize,
}

impl<R: Read> AudioInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: vec![0u8; BUFFER_SIZE * SAMPLE_BYTES],
            pending: 0,
        }
    }

    /// Fill `samples` from the stream.
    ///
    /// Returns the number of samples decoded, 0 at end of stream. A sample
    /// split across two reads is carried over to the next call.
    pub fn read_block(&mut self, samples: &mut [f32]) -> Result<usize> {
        if samples.is_empty() {
            return Ok(0);
        }
        let wanted = samples.len().min(BUFFER_SIZE) * SAMPLE_BYTES;
        let mut filled = self.pending;
        while filled < SAMPLE_BYTES {
            let n = self
                .reader
                .read(&mut self.buffer[filled..wanted])
                .map_err(|e| PhsError::AudioInputError { message: e.to_string() })?;
            if n == 0 {
                if filled > 0 {
                    warn!(bytes = filled, "dropping incomplete trailing sample");
                }
                self.pending = 0;
                return Ok(0);
            }
            filled += n;
        }

        let count = filled / SAMPLE_BYTES;
        for (sample, bytes) in samples.iter_mut().zip(self.buffer[..count * SAMPLE_BYTES].chunks_exact(SAMPLE_BYTES)) {
            *sample = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }

        self.pending = filled - count * SAMPLE_BYTES;
        self.buffer.copy_within(count * SAMPLE_BYTES..filled, 0);
        Ok(count)
    }
}

/// Block writer of `f32le` samples.
pub struct AudioOutput<W> {
    writer: W,
    buffer: Vec<u8>,
}

impl<W: Write> AudioOutput<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buffer: Vec::with_capacity(BUFFER_SIZE * SAMPLE_BYTES),
        }
    }

    pub fn write_block(&mut self, samples: &[f32]) -> Result<()> {
        self.buffer.clear();
        for sample in samples {
            self.buffer.extend_from_slice(&sample.to_le_bytes());
        }
        self.writer
            .write_all(&self.buffer)
            .map_err(|e| PhsError::AudioOutputError { message: e.to_string() })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| PhsError::AudioOutputError { message: e.to_string() })
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Stream `reader` through `processor` into `writer`; returns the number
/// of samples processed.
pub fn process_stream<R: Read, W: Write>(processor: &mut PortProcessor, reader: R, writer: W) -> Result<usize> {
    let mut input = AudioInput::new(reader);
    let mut output = AudioOutput::new(writer);

    let mut in_samples = vec![0.0f32; BUFFER_SIZE];
    let mut out_samples = vec![0.0f32; BUFFER_SIZE];
    let mut total = 0;

    loop {
        let n = input.read_block(&mut in_samples)?;
        if n == 0 {
            break;
        }
        processor.process_block(&in_samples[..n], &mut out_samples[..n])?;
        output.write_block(&out_samples[..n])?;
        total += n;
    }

    output.flush()?;
    info!(
        samples = total,
        nonconverged = processor.nonconverged_steps(),
        "stream processed"
    );
    Ok(total)
}

/// Process audio from stdin to stdout.
pub fn process_audio(processor: &mut PortProcessor) -> Result<usize> {
    process_stream(processor, io::stdin().lock(), io::stdout().lock())
}
