use super::{get_u64, put_u64};
use crate::{BLOCK_SIZE, INODE_SIZE};

/// 超级块：
/// - 记录 inode 与数据块的容量；
/// - 定位其后的四个连续区域
///
/// 格式化时写入一次，此后不再修改。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    pub num_inodes: usize,
    pub num_data_blocks: usize,
    /// inode 位图的起始字节
    pub i_bitmap_ptr: usize,
    /// 数据块位图的起始字节
    pub d_bitmap_ptr: usize,
    /// inode 表的起始字节
    pub i_blocks_ptr: usize,
    /// 数据块区域的起始字节
    pub d_blocks_ptr: usize,
}

impl SuperBlock {
    pub const SIZE: usize = 48;

    /// 依次累加前一区域的大小，得出各区域的起始偏移
    pub fn new(num_inodes: usize, num_data_blocks: usize) -> Self {
        let i_bitmap_ptr = Self::SIZE;
        let d_bitmap_ptr = i_bitmap_ptr + num_inodes.div_ceil(8);
        let i_blocks_ptr = d_bitmap_ptr + num_data_blocks.div_ceil(8);
        let d_blocks_ptr = i_blocks_ptr + num_inodes * INODE_SIZE;

        Self {
            num_inodes,
            num_data_blocks,
            i_bitmap_ptr,
            d_bitmap_ptr,
            i_blocks_ptr,
            d_blocks_ptr,
        }
    }

    pub fn decode(raw: &[u8; Self::SIZE]) -> Self {
        let field = |i: usize| get_u64(raw, i * 8) as usize;
        Self {
            num_inodes: field(0),
            num_data_blocks: field(1),
            i_bitmap_ptr: field(2),
            d_bitmap_ptr: field(3),
            i_blocks_ptr: field(4),
            d_blocks_ptr: field(5),
        }
    }

    pub fn encode(&self, raw: &mut [u8; Self::SIZE]) {
        let fields = [
            self.num_inodes,
            self.num_data_blocks,
            self.i_bitmap_ptr,
            self.d_bitmap_ptr,
            self.i_blocks_ptr,
            self.d_blocks_ptr,
        ];
        for (i, field) in fields.into_iter().enumerate() {
            put_u64(raw, i * 8, field as u64);
        }
    }

    /// 镜像至少要有多少字节才能容纳全部区域
    #[inline]
    pub fn required_bytes(&self) -> usize {
        self.d_blocks_ptr + self.num_data_blocks * BLOCK_SIZE
    }

    /// 检查读自磁盘的超级块：区域顺序正确、彼此衔接且都落在镜像之内。
    /// 数值来自磁盘，运算一律使用带溢出检查的版本。
    pub fn is_valid(&self, image_len: usize) -> bool {
        if self.num_inodes == 0 || self.num_data_blocks == 0 {
            return false;
        }
        if self.num_inodes % 32 != 0 || self.num_data_blocks % 32 != 0 {
            return false;
        }

        let expected = (|| {
            let d_bitmap_ptr = Self::SIZE.checked_add(self.num_inodes.div_ceil(8))?;
            let i_blocks_ptr = d_bitmap_ptr.checked_add(self.num_data_blocks.div_ceil(8))?;
            let d_blocks_ptr =
                i_blocks_ptr.checked_add(self.num_inodes.checked_mul(INODE_SIZE)?)?;
            let end = d_blocks_ptr.checked_add(self.num_data_blocks.checked_mul(BLOCK_SIZE)?)?;
            Some((d_bitmap_ptr, i_blocks_ptr, d_blocks_ptr, end))
        })();

        match expected {
            Some((d_bitmap_ptr, i_blocks_ptr, d_blocks_ptr, end)) => {
                self.i_bitmap_ptr == Self::SIZE
                    && self.d_bitmap_ptr == d_bitmap_ptr
                    && self.i_blocks_ptr == i_blocks_ptr
                    && self.d_blocks_ptr == d_blocks_ptr
                    && end <= image_len
            }
            None => false,
        }
    }
}
