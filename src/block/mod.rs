//! Block device interface: fixed-size blocks read from and written to a
//! backing store, one per `BlockDevice` implementation.
//!
//! Grounded on `examples/original_source/fs/blockdevice.h`/`block.h`: a
//! `Block` is the in-memory copy of one logical block, owned while it is
//! "fixed" (mapped) and released with `unfix`, which writes it back if it
//! was marked dirty. This kernel has no block cache layered on top, so
//! `fix` is a synchronous read and `unfix` a synchronous
//! write-if-dirty, exactly like the original.

pub mod ata;
pub mod ramdisk;

use crate::lib::error::{Errno, KernelResult};
use alloc::boxed::Box;
use alloc::vec::Vec;

/// One in-memory copy of a logical block. Owns its backing buffer; the
/// device's native sector size may be smaller than the logical blocksize,
/// in which case `fix` issues more than one sector operation to fill it.
pub struct Block {
    pub number: u64,
    pub data: Vec<u8>,
    dirty: bool,
}

impl Block {
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Implemented once per backing store. `blocksize` must be a multiple of the
/// device's native sector size (512 for `AtaPio`, 512 for `RamDisk`); a
/// logical blocksize of 4096 over 512-byte sectors issues 8 consecutive
/// sector operations per `fix`/`unfix`.
pub trait BlockDevice: Send + Sync {
    fn native_sector_size(&self) -> usize;
    fn set_blocksize(&mut self, blocksize: usize) -> KernelResult<()>;
    fn blocksize(&self) -> usize;
    fn fix(&self, block_number: u64) -> KernelResult<Block>;
    fn unfix(&self, block: Block) -> KernelResult<()>;
    fn sync(&self) -> KernelResult<()>;

    fn read_sectors(&self, lba: u64, buf: &mut [u8]) -> KernelResult<()>;
    fn write_sectors(&self, lba: u64, buf: &[u8]) -> KernelResult<()>;
}

/// Shared helper for the `set_blocksize`/`fix`/`unfix` triad: any device
/// whose sector size evenly divides the requested blocksize can reuse this.
pub fn fix_over_sectors(dev: &dyn BlockDevice, block_number: u64) -> KernelResult<Block> {
    let blocksize = dev.blocksize();
    let sector_size = dev.native_sector_size();
    let sectors_per_block = blocksize / sector_size;
    let first_lba = block_number * sectors_per_block as u64;
    let mut data = alloc::vec![0u8; blocksize];
    for i in 0..sectors_per_block {
        let lba = first_lba + i as u64;
        let chunk = &mut data[i * sector_size..(i + 1) * sector_size];
        dev.read_sectors(lba, chunk)?;
    }
    Ok(Block { number: block_number, data, dirty: false })
}

pub fn unfix_over_sectors(dev: &dyn BlockDevice, block: Block) -> KernelResult<()> {
    if !block.dirty {
        return Ok(());
    }
    let blocksize = dev.blocksize();
    let sector_size = dev.native_sector_size();
    let sectors_per_block = blocksize / sector_size;
    let first_lba = block.number * sectors_per_block as u64;
    for i in 0..sectors_per_block {
        let lba = first_lba + i as u64;
        let chunk = &block.data[i * sector_size..(i + 1) * sector_size];
        dev.write_sectors(lba, chunk)?;
    }
    Ok(())
}

pub fn validate_blocksize(blocksize: usize, sector_size: usize) -> KernelResult<()> {
    if blocksize < sector_size || blocksize % sector_size != 0 || !blocksize.is_power_of_two() {
        return Err(Errno::EINVAL);
    }
    Ok(())
}

/// Boxed trait object, the handle the filesystem layer actually holds.
pub type BoxedBlockDevice = Box<dyn BlockDevice>;
