use crate::error::{Result, UploadError};

/// Half-open byte range `[start, end)` of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Splits `[0, total_size)` into `part_count` contiguous ranges of
/// `ceil(total_size / part_count)` bytes, the last one possibly shorter.
pub fn plan(total_size: u64, part_count: u32) -> Result<Vec<ByteRange>> {
    if total_size == 0 {
        return Err(UploadError::InvalidInput(
            "cannot plan parts for an empty file".to_string(),
        ));
    }
    if part_count == 0 {
        return Err(UploadError::InvalidInput(
            "part count must be at least 1".to_string(),
        ));
    }

    let chunk_size = total_size.div_ceil(part_count as u64);

    // every part must start inside the file
    if (part_count as u64 - 1) * chunk_size >= total_size {
        return Err(UploadError::InvalidInput(format!(
            "{} bytes cannot be split into {} non-empty parts of {} bytes",
            total_size, part_count, chunk_size
        )));
    }

    let ranges = (0..part_count as u64)
        .map(|i| ByteRange {
            start: i * chunk_size,
            end: ((i + 1) * chunk_size).min(total_size),
        })
        .collect();

    Ok(ranges)
}
