//! Directory entries: 64-byte records, a 4-byte little-endian inode number
//! followed by 60 bytes of name (zero-padded; a full-length name carries no
//! trailing NUL). Grounded on `examples/original_source/fs/minix/dir.cc`'s
//! `find_dirent`/`lookup`/`add_link`/`delete_entry` and
//! `examples/original_source/fs/minix/minix.h`'s `Minix_Dirent` layout.

use super::inode::MinixInode;
use super::{Minix, DIRENT_SIZE};
use crate::config::MINIX_NAME_LEN;
use crate::lib::error::{Errno, KernelResult};

pub struct DirEntry {
    pub ino: u32,
    pub name_len: usize,
    name: [u8; MINIX_NAME_LEN],
}

impl DirEntry {
    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len]
    }

    fn parse(raw: &[u8]) -> Self {
        let ino = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let mut name = [0u8; MINIX_NAME_LEN];
        name.copy_from_slice(&raw[4..4 + MINIX_NAME_LEN]);
        let name_len = name.iter().position(|&b| b == 0).unwrap_or(MINIX_NAME_LEN);
        DirEntry { ino, name_len, name }
    }

    fn write_into(ino: u32, filename: &[u8], raw: &mut [u8]) {
        raw[0..4].copy_from_slice(&ino.to_le_bytes());
        raw[4..4 + MINIX_NAME_LEN].fill(0);
        let len = filename.len().min(MINIX_NAME_LEN);
        raw[4..4 + len].copy_from_slice(&filename[..len]);
    }
}

fn size_in_blocks(dir: &MinixInode, blocksize: u64) -> u64 {
    let size = dir.disk.lock().size as u64;
    (size + blocksize - 1) / blocksize
}

/// Scans every allocated block of `dir` for an entry named `filename`.
pub fn find_entry(fs: &Minix, dir: &MinixInode, filename: &[u8]) -> KernelResult<Option<DirEntry>> {
    if filename.len() > MINIX_NAME_LEN {
        return Err(Errno::ENAMETOOLONG);
    }
    let blocksize = fs.device.blocksize() as u64;
    let num_blocks = size_in_blocks(dir, blocksize);
    let entries_per_block = blocksize as usize / DIRENT_SIZE;

    for lblock in 0..num_blocks {
        let zone = dir.get_block(fs, lblock, false)?;
        if zone == 0 {
            continue;
        }
        let block = fs.device.fix(zone as u64)?;
        for i in 0..entries_per_block {
            let offset = i * DIRENT_SIZE;
            let entry = DirEntry::parse(&block.data[offset..offset + DIRENT_SIZE]);
            if entry.ino != 0 && entry.name() == filename {
                fs.device.unfix(block)?;
                return Ok(Some(entry));
            }
        }
        fs.device.unfix(block)?;
    }
    Ok(None)
}

/// Every non-empty entry across the whole directory, for `readdir`.
pub fn iterate(fs: &Minix, dir: &MinixInode) -> KernelResult<alloc::vec::Vec<(u32, alloc::vec::Vec<u8>)>> {
    let blocksize = fs.device.blocksize() as u64;
    let num_blocks = size_in_blocks(dir, blocksize);
    let entries_per_block = blocksize as usize / DIRENT_SIZE;
    let mut out = alloc::vec::Vec::new();

    for lblock in 0..num_blocks {
        let zone = dir.get_block(fs, lblock, false)?;
        if zone == 0 {
            continue;
        }
        let block = fs.device.fix(zone as u64)?;
        for i in 0..entries_per_block {
            let offset = i * DIRENT_SIZE;
            let entry = DirEntry::parse(&block.data[offset..offset + DIRENT_SIZE]);
            if entry.ino != 0 {
                out.push((entry.ino, entry.name().to_vec()));
            }
        }
        fs.device.unfix(block)?;
    }
    Ok(out)
}

/// Adds `(ino, filename)` into the first free slot, growing the directory
/// by one block if every existing block is full.
pub fn add_entry(fs: &Minix, dir: &MinixInode, filename: &[u8], ino: u32) -> KernelResult<()> {
    if filename.len() > MINIX_NAME_LEN {
        return Err(Errno::ENAMETOOLONG);
    }
    let blocksize = fs.device.blocksize() as u64;
    let entries_per_block = blocksize as usize / DIRENT_SIZE;
    let mut num_blocks = size_in_blocks(dir, blocksize).max(1);

    for lblock in 0..num_blocks {
        let zone = dir.get_block(fs, lblock, true)?;
        let mut block = fs.device.fix(zone as u64)?;
        for i in 0..entries_per_block {
            let offset = i * DIRENT_SIZE;
            let existing = DirEntry::parse(&block.data[offset..offset + DIRENT_SIZE]);
            if existing.ino == 0 {
                DirEntry::write_into(ino, filename, &mut block.data[offset..offset + DIRENT_SIZE]);
                block.mark_dirty();
                fs.device.unfix(block)?;
                let mut disk = dir.disk.lock();
                let needed = (lblock + 1) * blocksize;
                if needed > disk.size as u64 {
                    disk.size = needed as u32;
                }
                return Ok(());
            }
        }
        fs.device.unfix(block)?;
    }

    num_blocks += 1;
    let zone = dir.get_block(fs, num_blocks - 1, true)?;
    let mut block = fs.device.fix(zone as u64)?;
    block.data.iter_mut().for_each(|b| *b = 0);
    DirEntry::write_into(ino, filename, &mut block.data[0..DIRENT_SIZE]);
    block.mark_dirty();
    fs.device.unfix(block)?;
    let mut disk = dir.disk.lock();
    disk.size = (num_blocks * blocksize) as u32;
    Ok(())
}

/// Zeroes the entry named `filename`, without shrinking the directory.
pub fn remove_entry(fs: &Minix, dir: &MinixInode, filename: &[u8]) -> KernelResult<()> {
    let blocksize = fs.device.blocksize() as u64;
    let entries_per_block = blocksize as usize / DIRENT_SIZE;
    let num_blocks = size_in_blocks(dir, blocksize);

    for lblock in 0..num_blocks {
        let zone = dir.get_block(fs, lblock, false)?;
        if zone == 0 {
            continue;
        }
        let mut block = fs.device.fix(zone as u64)?;
        for i in 0..entries_per_block {
            let offset = i * DIRENT_SIZE;
            let entry = DirEntry::parse(&block.data[offset..offset + DIRENT_SIZE]);
            if entry.ino != 0 && entry.name() == filename {
                block.data[offset..offset + DIRENT_SIZE].fill(0);
                block.mark_dirty();
                fs.device.unfix(block)?;
                return Ok(());
            }
        }
        fs.device.unfix(block)?;
    }
    Err(Errno::ENOENT)
}

/// A freshly-allocated directory's first block: `.` and `..` entries.
pub fn make_empty(fs: &Minix, dir: &MinixInode, parent_ino: u32, self_ino: u32) -> KernelResult<()> {
    let zone = dir.get_block(fs, 0, true)?;
    let mut block = fs.device.fix(zone as u64)?;
    block.data.iter_mut().for_each(|b| *b = 0);
    DirEntry::write_into(self_ino, b".", &mut block.data[0..DIRENT_SIZE]);
    DirEntry::write_into(parent_ino, b"..", &mut block.data[DIRENT_SIZE..2 * DIRENT_SIZE]);
    block.mark_dirty();
    fs.device.unfix(block)?;
    dir.disk.lock().size = (2 * DIRENT_SIZE) as u32;
    Ok(())
}

/// A directory is empty once its only live entries are `.` and `..`.
pub fn is_empty(fs: &Minix, dir: &MinixInode) -> KernelResult<bool> {
    Ok(iterate(fs, dir)?.iter().all(|(_, name)| name == b"." || name == b".."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirent_round_trips_short_name() {
        let mut raw = [0u8; DIRENT_SIZE];
        DirEntry::write_into(7, b"hello.txt", &mut raw);
        let parsed = DirEntry::parse(&raw);
        assert_eq!(parsed.ino, 7);
        assert_eq!(parsed.name(), b"hello.txt");
    }

    #[test]
    fn full_length_name_has_no_trailing_nul() {
        let name = [b'a'; MINIX_NAME_LEN];
        let mut raw = [0u8; DIRENT_SIZE];
        DirEntry::write_into(3, &name, &mut raw);
        let parsed = DirEntry::parse(&raw);
        assert_eq!(parsed.name_len, MINIX_NAME_LEN);
        assert_eq!(parsed.name(), &name[..]);
    }

    #[test]
    fn sixty_char_name_round_trips_with_no_trailing_nul() {
        let name = [b'x'; 60];
        let mut raw = [0u8; DIRENT_SIZE];
        DirEntry::write_into(9, &name, &mut raw);
        let parsed = DirEntry::parse(&raw);
        assert_eq!(parsed.name_len, 60);
        assert_eq!(parsed.name(), &name[..]);
    }
}
