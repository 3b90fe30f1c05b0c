//! A `BlockDevice` backed by a heap buffer instead of real hardware. This is
//! the default boot image device: it has no dependency on whether the host
//! actually has an ATA controller wired up, so tests and `cargo test`-style
//! runs can mount a Minix filesystem without touching I/O ports.

use super::{fix_over_sectors, unfix_over_sectors, validate_blocksize, Block, BlockDevice};
use crate::lib::error::{Errno, KernelResult};
use alloc::vec::Vec;
use spin::Mutex;

const SECTOR_SIZE: usize = 512;

pub struct RamDisk {
    storage: Mutex<Vec<u8>>,
    blocksize: Mutex<usize>,
}

impl RamDisk {
    pub fn new(sectors: usize) -> Self {
        Self { storage: Mutex::new(alloc::vec![0u8; sectors * SECTOR_SIZE]), blocksize: Mutex::new(SECTOR_SIZE) }
    }

    /// Seeds the disk with a pre-built image (e.g. a `mkfs.minix` output),
    /// growing the backing buffer if the image is larger.
    pub fn load_image(&self, image: &[u8]) {
        let mut storage = self.storage.lock();
        if storage.len() < image.len() {
            storage.resize(image.len(), 0);
        }
        storage[..image.len()].copy_from_slice(image);
    }
}

impl BlockDevice for RamDisk {
    fn native_sector_size(&self) -> usize {
        SECTOR_SIZE
    }

    fn set_blocksize(&mut self, blocksize: usize) -> KernelResult<()> {
        validate_blocksize(blocksize, SECTOR_SIZE)?;
        *self.blocksize.lock() = blocksize;
        Ok(())
    }

    fn blocksize(&self) -> usize {
        *self.blocksize.lock()
    }

    fn fix(&self, block_number: u64) -> KernelResult<Block> {
        fix_over_sectors(self, block_number)
    }

    fn unfix(&self, block: Block) -> KernelResult<()> {
        unfix_over_sectors(self, block)
    }

    fn sync(&self) -> KernelResult<()> {
        Ok(())
    }

    fn read_sectors(&self, lba: u64, buf: &mut [u8]) -> KernelResult<()> {
        let storage = self.storage.lock();
        let start = lba as usize * SECTOR_SIZE;
        let end = start + buf.len();
        if end > storage.len() {
            return Err(Errno::EIO);
        }
        buf.copy_from_slice(&storage[start..end]);
        Ok(())
    }

    fn write_sectors(&self, lba: u64, buf: &[u8]) -> KernelResult<()> {
        let mut storage = self.storage.lock();
        let start = lba as usize * SECTOR_SIZE;
        let end = start + buf.len();
        if end > storage.len() {
            return Err(Errno::EIO);
        }
        storage[start..end].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut disk = RamDisk::new(16);
        disk.set_blocksize(1024).unwrap();
        let block = disk.fix(0).unwrap();
        let mut block = block;
        block.data[0] = 0x42;
        block.mark_dirty();
        disk.unfix(block).unwrap();
        let block = disk.fix(0).unwrap();
        assert_eq!(block.data[0], 0x42);
    }

    #[test]
    fn rejects_non_power_of_two_blocksize() {
        let mut disk = RamDisk::new(16);
        assert!(disk.set_blocksize(700).is_err());
    }
}
