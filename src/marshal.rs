use std::mem;

use bytemuck::{Pod};

use crate::buffer::*;
use crate::error::*;

// Reinterprets a byte region as a sequence of fixed-stride records
pub fn view_records<T : Pod>(bytes : &[u8]) -> Result<&[T]> {
    let stride = mem::size_of::<T>();

    if stride == 0 || bytes.len() % stride != 0 {
        return Err(Error::RecordLayout {
            len     : bytes.len(),
            stride  : stride,
        });
    }

    bytemuck::try_cast_slice(bytes).map_err(|e|
        Error::HostAccess(format!("Cannot view mapped region as records: {e}")))
}

// Mutable counterpart of `view_records`
pub fn view_records_mut<T : Pod>(bytes : &mut [u8]) -> Result<&mut [T]> {
    let stride = mem::size_of::<T>();

    if stride == 0 || bytes.len() % stride != 0 {
        return Err(Error::RecordLayout {
            len     : bytes.len(),
            stride  : stride,
        });
    }

    bytemuck::try_cast_slice_mut(bytes).map_err(|e|
        Error::HostAccess(format!("Cannot view mapped region as records: {e}")))
}

// Copies records into the start of a host-writable buffer. The memory
// is unmapped again before returning.
pub fn upload_records<T : Pod>(buffer : &mut Buffer, records : &[T]) -> Result<()> {
    let bytes : &[u8] = bytemuck::cast_slice(records);
    let capacity = buffer.info().size;

    if bytes.len() > capacity {
        return Err(Error::HostAccess(format!(
            "{} bytes of records do not fit into {capacity} byte buffer", bytes.len())));
    }

    let mut region = buffer.map_mut()?;
    view_records_mut::<T>(&mut region[..bytes.len()])?.copy_from_slice(records);

    tracing::debug!(records = records.len(), bytes = bytes.len(), "uploaded records");
    Ok(())
}

// Copies `count` records out of a host-readable buffer
pub fn download_records<T : Pod>(buffer : &Buffer, count : usize) -> Result<Vec<T>> {
    let size = count.checked_mul(mem::size_of::<T>())
        .filter(|&size| size <= buffer.info().size)
        .ok_or_else(|| Error::HostAccess(format!(
            "{count} records do not fit into {} byte buffer", buffer.info().size)))?;

    let region = buffer.map()?;
    let records = view_records::<T>(&region[..size])?.to_vec();

    tracing::debug!(records = records.len(), bytes = size, "downloaded records");
    Ok(records)
}
