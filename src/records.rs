use std::mem;

use bytemuck::{Pod, Zeroable};

// Number of limbs in a field element
pub const LIMB_COUNT : usize = 10;


// Field element record, ten 32-bit limbs. Output record of the kernel.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct Fe25519 {
    pub value : [i32; LIMB_COUNT],
}

impl Fe25519 {
    pub fn new(value : [i32; LIMB_COUNT]) -> Self {
        Self { value : value }
    }

    // Limbs start, start + 1, ...
    pub fn sequence(start : i32) -> Self {
        Self::new(std::array::from_fn(|i| start + i as i32))
    }
}


// Pair of field elements. Input record of the kernel.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DoubleFe25519 {
    pub value : [Fe25519; 2],
}

impl DoubleFe25519 {
    pub fn new(a : Fe25519, b : Fe25519) -> Self {
        Self { value : [a, b] }
    }

    // Fixed input written when no input file is given
    pub fn test_pattern() -> Self {
        Self::new(Fe25519::sequence(10), Fe25519::sequence(0))
    }
}


// Record count and per-record strides for both buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLayout {
    pub record_count  : usize,
    pub input_stride  : usize,
    pub output_stride : usize,
}

impl BatchLayout {
    pub fn new<I : Pod, O : Pod>(record_count : usize) -> Self {
        Self {
            record_count  : record_count,
            input_stride  : mem::size_of::<I>(),
            output_stride : mem::size_of::<O>(),
        }
    }

    // Layout used by the field arithmetic kernels
    pub fn fe25519(record_count : usize) -> Self {
        Self::new::<DoubleFe25519, Fe25519>(record_count)
    }

    pub fn input_size(&self) -> usize {
        self.record_count * self.input_stride
    }

    pub fn output_size(&self) -> usize {
        self.record_count * self.output_stride
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_match_kernel_layout() {
        assert_eq!(mem::size_of::<Fe25519>(), 40);
        assert_eq!(mem::size_of::<DoubleFe25519>(), 80);
        assert_eq!(mem::align_of::<DoubleFe25519>(), 4);
    }

    #[test]
    fn test_pattern_limbs() {
        let r = DoubleFe25519::test_pattern();

        assert_eq!(r.value[0].value, [10, 11, 12, 13, 14, 15, 16, 17, 18, 19]);
        assert_eq!(r.value[1].value, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn pattern_bytes_follow_limb_order() {
        let r = DoubleFe25519::test_pattern();
        let bytes = bytemuck::bytes_of(&r);

        assert_eq!(&bytes[0..4], &10i32.to_ne_bytes());
        assert_eq!(&bytes[40..44], &0i32.to_ne_bytes());
        assert_eq!(&bytes[76..80], &9i32.to_ne_bytes());
    }

    #[test]
    fn layout_sizes() {
        let layout = BatchLayout::fe25519(16);

        assert_eq!(layout.input_size(), 16 * 80);
        assert_eq!(layout.output_size(), 16 * 40);
    }
}
