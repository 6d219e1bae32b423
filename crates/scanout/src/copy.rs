/// Copies `rows` rows of `row_bytes` each between buffers whose strides may
/// differ. The row length is clamped to both strides and the row count to
/// what both buffers can hold, so neither slice is ever overrun. Returns the
/// number of rows copied.
pub fn copy_rows(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    row_bytes: usize,
    rows: usize,
) -> usize {
    let len = row_bytes.min(src_stride).min(dst_stride);
    if len == 0 {
        return 0;
    }

    let rows = rows
        .min(rows_available(src.len(), src_stride, len))
        .min(rows_available(dst.len(), dst_stride, len));

    for row in 0..rows {
        let src_start = row * src_stride;
        let dst_start = row * dst_stride;
        dst[dst_start..dst_start + len].copy_from_slice(&src[src_start..src_start + len]);
    }
    rows
}

/// Rows of `len` bytes addressable in a buffer of `total` bytes; the last
/// row does not need a full stride behind it.
fn rows_available(total: usize, stride: usize, len: usize) -> usize {
    if total < len {
        0
    } else {
        (total - len) / stride + 1
    }
}
