// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Least-significant-bit-first reader, as used by the JPEG XL size header
//! and the VP8L image header.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BitReaderError {
    pub requested: u32,
    pub remaining: usize,
}

pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() * 8 - self.position
    }

    /// Read `bits` bits (at most 32), first bit read is the least significant.
    pub fn read(&mut self, bits: u32) -> Result<u32, BitReaderError> {
        debug_assert!(bits <= 32);
        let remaining = self.remaining();
        if bits as usize > remaining || bits > 32 {
            return Err(BitReaderError { requested: bits, remaining });
        }
        let mut value = 0u32;
        for i in 0..bits {
            let pos = self.position + i as usize;
            let bit = (self.data[pos / 8] >> (pos % 8)) & 1;
            value |= u32::from(bit) << i;
        }
        self.position += bits as usize;
        Ok(value)
    }

    pub fn read_bool(&mut self) -> Result<bool, BitReaderError> {
        Ok(self.read(1)? == 1)
    }
}

#[test]
fn reads_lsb_first() {
    let data = [0b1010_0110, 0xff];
    let mut br = BitReader::new(&data);
    assert_eq!(br.remaining(), 16);
    assert!(!br.read_bool().unwrap());
    assert_eq!(br.read(2).unwrap(), 0b11);
    assert_eq!(br.read(5).unwrap(), 0b10100);
    assert_eq!(br.read(8).unwrap(), 0xff);
    assert_eq!(br.remaining(), 0);
}

#[test]
fn spans_more_than_64_bits() {
    let data = [0u8, 0, 0, 0, 0, 0, 0, 0, 0x80];
    let mut br = BitReader::new(&data);
    assert_eq!(br.read(32).unwrap(), 0);
    assert_eq!(br.read(32).unwrap(), 0);
    assert_eq!(br.read(8).unwrap(), 0x80);
}

#[test]
fn refuses_to_overread() {
    let mut br = BitReader::new(&[0x1f]);
    assert_eq!(br.read(5).unwrap(), 0x1f);
    assert_eq!(br.read(4), Err(BitReaderError { requested: 4, remaining: 3 }));
    // A failed read doesn't move the cursor.
    assert_eq!(br.read(3).unwrap(), 0);
}
