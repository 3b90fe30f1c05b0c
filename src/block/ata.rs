//! Primary ATA channel, 28-bit LBA, PIO mode. Grounded on the generic
//! ATA/IDE PIO register protocol: ports 0x1F0-0x1F7, polled `BSY`/`DRQ`
//! status bits, `pause`-spinning while waiting exactly like
//! [`crate::sync::TicketLock`] spins on its ticket.

use super::{fix_over_sectors, unfix_over_sectors, validate_blocksize, Block, BlockDevice};
use crate::lib::error::{Errno, KernelResult};
use spin::Mutex;
use x86_64::instructions::port::Port;

const DATA: u16 = 0x1F0;
const ERROR: u16 = 0x1F1;
const SECTOR_COUNT: u16 = 0x1F2;
const LBA_LOW: u16 = 0x1F3;
const LBA_MID: u16 = 0x1F4;
const LBA_HIGH: u16 = 0x1F5;
const DRIVE_HEAD: u16 = 0x1F6;
const STATUS: u16 = 0x1F7;
const COMMAND: u16 = 0x1F7;

const CMD_READ_SECTORS: u8 = 0x20;
const CMD_WRITE_SECTORS: u8 = 0x30;

const STATUS_ERR: u8 = 1 << 0;
const STATUS_DRQ: u8 = 1 << 3;
const STATUS_BSY: u8 = 1 << 7;

pub const SECTOR_SIZE: usize = 512;

pub struct AtaPio {
    lock: Mutex<()>,
    blocksize: Mutex<usize>,
}

impl AtaPio {
    /// # Safety
    /// Assumes the primary ATA channel is present and not shared with
    /// another driver.
    pub const unsafe fn new() -> Self {
        Self { lock: Mutex::new(()), blocksize: Mutex::new(SECTOR_SIZE) }
    }

    fn wait_not_busy(&self) -> KernelResult<u8> {
        for _ in 0..1_000_000u32 {
            let status: u8 = unsafe { Port::new(STATUS).read() };
            if status & STATUS_BSY == 0 {
                return Ok(status);
            }
            core::hint::spin_loop();
        }
        Err(Errno::EIO)
    }

    fn select_lba(&self, lba: u32, count: u8) {
        unsafe {
            Port::<u8>::new(DRIVE_HEAD).write(0xE0 | ((lba >> 24) & 0x0F) as u8);
            Port::<u8>::new(SECTOR_COUNT).write(count);
            Port::<u8>::new(LBA_LOW).write((lba & 0xFF) as u8);
            Port::<u8>::new(LBA_MID).write(((lba >> 8) & 0xFF) as u8);
            Port::<u8>::new(LBA_HIGH).write(((lba >> 16) & 0xFF) as u8);
        }
    }

    fn read_one_sector(&self, lba: u32, buf: &mut [u8]) -> KernelResult<()> {
        debug_assert_eq!(buf.len(), SECTOR_SIZE);
        let _guard = self.lock.lock();
        self.wait_not_busy()?;
        self.select_lba(lba, 1);
        unsafe { Port::<u8>::new(COMMAND).write(CMD_READ_SECTORS) };
        let status = self.wait_not_busy()?;
        if status & STATUS_ERR != 0 || status & STATUS_DRQ == 0 {
            let _: u8 = unsafe { Port::new(ERROR).read() };
            return Err(Errno::EIO);
        }
        let mut data: Port<u16> = Port::new(DATA);
        for chunk in buf.chunks_exact_mut(2) {
            let word = unsafe { data.read() };
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        Ok(())
    }

    fn write_one_sector(&self, lba: u32, buf: &[u8]) -> KernelResult<()> {
        debug_assert_eq!(buf.len(), SECTOR_SIZE);
        let _guard = self.lock.lock();
        self.wait_not_busy()?;
        self.select_lba(lba, 1);
        unsafe { Port::<u8>::new(COMMAND).write(CMD_WRITE_SECTORS) };
        let status = self.wait_not_busy()?;
        if status & STATUS_ERR != 0 {
            return Err(Errno::EIO);
        }
        let mut data: Port<u16> = Port::new(DATA);
        for chunk in buf.chunks_exact(2) {
            let word = u16::from_le_bytes([chunk[0], chunk[1]]);
            unsafe { data.write(word) };
        }
        Ok(())
    }
}

impl BlockDevice for AtaPio {
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
        self.read_one_sector(lba as u32, buf)
    }

    fn write_sectors(&self, lba: u64, buf: &[u8]) -> KernelResult<()> {
        self.write_one_sector(lba as u32, buf)
    }
}
