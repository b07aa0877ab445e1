use super::{get_u32, put_u32};

/// 位图里每组的位数
const GROUP_BITS: usize = 32;

/// 位图区域，记录其指示区域的分配情况，1 表示已分配。
///
/// 位以 32 位小端字为一组，组内从最高位开始编号：
/// 第 `position` 位位于第 `position / 32` 组的第 `31 - position % 32` 位。
#[derive(Debug, Clone, Copy)]
pub struct Bitmap {
    /// 位图在镜像中的起始字节
    start: usize,
    /// 位图所指示区域的单元总数
    capacity: usize,
}

impl Bitmap {
    #[inline]
    pub fn new(start: usize, capacity: usize) -> Self {
        Self { start, capacity }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, image: &[u8], position: usize) -> bool {
        if position >= self.capacity {
            return false;
        }
        let (offset, mask) = self.locate(position);
        get_u32(image, offset) & mask != 0
    }

    /// 线性扫描，返回第一个空闲位的编号
    pub fn find_first_free(&self, image: &[u8]) -> Option<usize> {
        (0..self.capacity.div_ceil(GROUP_BITS))
            .find_map(|group_index| {
                let bits = get_u32(image, self.start + group_index * 4);
                (bits != u32::MAX)
                    .then(|| group_index * GROUP_BITS + bits.leading_ones() as usize)
            })
            .filter(|&position| position < self.capacity)
    }

    /// 置位或清位，重复操作无副作用
    pub fn set(&self, image: &mut [u8], position: usize, value: bool) {
        debug_assert!(position < self.capacity);
        let (offset, mask) = self.locate(position);
        let bits = get_u32(image, offset);
        put_u32(image, offset, if value { bits | mask } else { bits & !mask });
    }

    /// 在指示区域内分配新的单元，返回其编号。
    /// 若位图的空间用尽，则返回空。
    pub fn alloc(&self, image: &mut [u8]) -> Option<usize> {
        let position = self.find_first_free(image)?;
        self.set(image, position, true);
        Some(position)
    }

    pub fn dealloc(&self, image: &mut [u8], position: usize) {
        if !self.get(image, position) {
            log::warn!("bit {position} released twice");
        }
        self.set(image, position, false);
    }

    /// 已分配的单元个数
    pub fn count_allocated(&self, image: &[u8]) -> usize {
        (0..self.capacity.div_ceil(GROUP_BITS))
            .map(|group_index| get_u32(image, self.start + group_index * 4).count_ones() as usize)
            .sum()
    }

    /// 所在组的字节偏移与组内掩码
    #[inline]
    fn locate(&self, position: usize) -> (usize, u32) {
        let offset = self.start + position / GROUP_BITS * 4;
        let mask = 1 << (GROUP_BITS - 1 - position % GROUP_BITS);
        (offset, mask)
    }
}
