//! 通用工具：将文件长度按块大小拆分为若干区间。

use std::num::NonZeroU64;

/// One block-sized piece of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub index: u64,
    pub offset: u64,
    pub len: u64,
}

/// Number of blocks needed to hold `length` bytes.
#[inline]
pub fn block_count(length: u64, block_size: NonZeroU64) -> u64 {
    length.div_ceil(block_size.get())
}

/// Split `[0, length)` into consecutive spans of `block_size`; the last span
/// holds the remainder.
pub fn split_into_blocks(length: u64, block_size: NonZeroU64) -> Vec<BlockSpan> {
    let bs = block_size.get();
    let mut out = Vec::with_capacity(block_count(length, block_size) as usize);
    let mut offset = 0u64;
    while offset < length {
        let len = bs.min(length - offset);
        out.push(BlockSpan {
            index: offset / bs,
            offset,
            len,
        });
        offset += len;
    }
    out
}
