//! Kernel error taxonomy: the POSIX errno subset this kernel's filesystem,
//! VFS, and block layers actually return.

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errno {
    EPERM = 1,        // Operation not permitted
    ENOENT = 2,       // No such file or directory
    EIO = 5,          // I/O error
    EBADF = 9,        // Bad file descriptor
    EAGAIN = 11,      // Try again (transient; re-enter the walk from the top)
    ENOMEM = 12,      // Out of memory
    EFAULT = 14,      // Bad address
    EBUSY = 16,       // Device or resource busy
    EEXIST = 17,      // File exists
    EXDEV = 18,       // Cross-device link
    ENOTDIR = 20,     // Not a directory
    EISDIR = 21,      // Is a directory
    EINVAL = 22,      // Invalid argument
    EMFILE = 24,      // Too many open files
    ENOSPC = 28,      // No space left on device
    ENAMETOOLONG = 36, // File name too long
    ENOTEMPTY = 39,   // Directory not empty
    ELOOP = 40,       // Too many symbolic links encountered
}

impl Errno {
    /// Negate into the convention the on-disk and block layers pass upward
    /// (a negative return value carries the errno).
    pub fn as_neg_isize(self) -> isize {
        -(self as i32 as isize)
    }

    pub fn description(self) -> &'static str {
        match self {
            Errno::EPERM => "Operation not permitted",
            Errno::ENOENT => "No such file or directory",
            Errno::EIO => "I/O error",
            Errno::EBADF => "Bad file descriptor",
            Errno::EAGAIN => "Try again",
            Errno::ENOMEM => "Out of memory",
            Errno::EFAULT => "Bad address",
            Errno::EBUSY => "Device or resource busy",
            Errno::EEXIST => "File exists",
            Errno::EXDEV => "Cross-device link",
            Errno::ENOTDIR => "Not a directory",
            Errno::EISDIR => "Is a directory",
            Errno::EINVAL => "Invalid argument",
            Errno::EMFILE => "Too many open files",
            Errno::ENOSPC => "No space left on device",
            Errno::ENAMETOOLONG => "File name too long",
            Errno::ENOTEMPTY => "Directory not empty",
            Errno::ELOOP => "Too many symbolic links encountered",
        }
    }

    /// Recover an `Errno` from a negated return value (e.g. `-2` -> `ENOENT`).
    pub fn from_neg_isize(value: isize) -> Self {
        match -value {
            1 => Errno::EPERM,
            2 => Errno::ENOENT,
            5 => Errno::EIO,
            9 => Errno::EBADF,
            11 => Errno::EAGAIN,
            12 => Errno::ENOMEM,
            14 => Errno::EFAULT,
            16 => Errno::EBUSY,
            17 => Errno::EEXIST,
            18 => Errno::EXDEV,
            20 => Errno::ENOTDIR,
            21 => Errno::EISDIR,
            24 => Errno::EMFILE,
            28 => Errno::ENOSPC,
            36 => Errno::ENAMETOOLONG,
            39 => Errno::ENOTEMPTY,
            40 => Errno::ELOOP,
            _ => Errno::EINVAL,
        }
    }
}

pub type KernelResult<T> = core::result::Result<T, Errno>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_negated_isize() {
        for e in [Errno::ENOENT, Errno::ELOOP, Errno::ENOTEMPTY, Errno::EAGAIN] {
            assert_eq!(Errno::from_neg_isize(e.as_neg_isize()), e);
        }
    }

    #[test]
    fn unknown_negated_value_defaults_to_invalid_argument() {
        assert_eq!(Errno::from_neg_isize(-999), Errno::EINVAL);
    }
}
