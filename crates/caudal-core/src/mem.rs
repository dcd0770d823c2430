//! Double-mapped virtual memory for branch-free wrap-around reads.
//!
//! The same physical pages are mapped twice at consecutive virtual addresses:
//! a window of up to `len` bytes starting anywhere inside the first mapping is
//! always contiguous, so ring buffers over this region never split a read or
//! write at the wrap point.
//!
//! Available on unix targets only; [`CircularBuffer`](crate::CircularBuffer)
//! falls back to mirrored heap storage elsewhere.

#![cfg(unix)]

use std::io;
use std::os::fd::{FromRawFd, OwnedFd};
use std::ptr;

use crate::error::{CoreError, Result};

/// Bytes per virtual memory page on this host.
pub fn page_size() -> usize {
    // SAFETY: sysconf(_SC_PAGESIZE) has no preconditions.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// Smallest capacity `>= min_capacity` whose byte size is a whole number of
/// pages for elements of `stride` bytes.
pub fn aligned_capacity(min_capacity: usize, stride: usize, page: usize) -> usize {
    fn gcd(a: usize, b: usize) -> usize {
        if b == 0 { a } else { gcd(b, a % b) }
    }
    // elements in one stride/page common period
    let period = page / gcd(stride, page);
    let min_capacity = min_capacity.max(1);
    min_capacity.div_ceil(period) * period
}

/// A region of `len` physical bytes mapped twice back to back.
///
/// Owns both mappings; unmaps the full `2 * len` reservation on drop. The
/// region itself is inert storage — all read/write coordination lives in the
/// ring buffer layered on top.
#[derive(Debug)]
pub struct DoubleMappedRegion {
    base: ptr::NonNull<u8>,
    len: usize,
}

// SAFETY: the region is plain memory; the buffer built on top serialises all
// access through atomic cursors.
unsafe impl Send for DoubleMappedRegion {}
unsafe impl Sync for DoubleMappedRegion {}

impl DoubleMappedRegion {
    /// Maps at least `min_len` bytes (rounded up to whole pages) twice.
    ///
    /// Fails with [`CoreError::ResourceExhausted`] when the kernel declines
    /// the backing file, the address-space reservation, or either mapping.
    pub fn new(min_len: usize) -> Result<Self> {
        let page = page_size();
        let len = min_len.max(1).div_ceil(page) * page;

        let fd = memory_fd(len)?;
        let fd_raw = std::os::fd::AsRawFd::as_raw_fd(&fd);

        // Reserve 2*len of address space, then map the file over each half.
        // SAFETY: anonymous PROT_NONE reservation with no aliasing concerns.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                2 * len,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(map_error("address-space reservation"));
        }

        for half in 0..2usize {
            // SAFETY: MAP_FIXED targets lie inside the reservation we own.
            let at = unsafe {
                libc::mmap(
                    (base as *mut u8).add(half * len) as *mut libc::c_void,
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED | libc::MAP_FIXED,
                    fd_raw,
                    0,
                )
            };
            if at == libc::MAP_FAILED {
                let err = map_error("double mapping");
                // SAFETY: unmapping the reservation we just created.
                unsafe { libc::munmap(base, 2 * len) };
                return Err(err);
            }
        }

        Ok(Self {
            // SAFETY: mmap success implies non-null.
            base: unsafe { ptr::NonNull::new_unchecked(base as *mut u8) },
            len,
        })
    }

    /// Base of the first mapping.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Usable length in bytes (half the mapped address range).
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when `len() == 0` — never the case for a constructed region.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for DoubleMappedRegion {
    fn drop(&mut self) {
        // SAFETY: both halves came from one reservation of 2*len.
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, 2 * self.len);
        }
    }
}

fn map_error(what: &str) -> CoreError {
    CoreError::ResourceExhausted(format!("{what} failed: {}", io::Error::last_os_error()))
}

/// An anonymous memory file of `len` bytes to back both mappings.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn memory_fd(len: usize) -> Result<OwnedFd> {
    // SAFETY: memfd_create with a static name; ftruncate on the fresh fd.
    unsafe {
        let fd = libc::memfd_create(c"caudal-ring".as_ptr(), libc::MFD_CLOEXEC);
        if fd < 0 {
            return Err(map_error("memfd_create"));
        }
        let fd = OwnedFd::from_raw_fd(fd);
        if libc::ftruncate(std::os::fd::AsRawFd::as_raw_fd(&fd), len as libc::off_t) != 0 {
            return Err(map_error("ftruncate"));
        }
        Ok(fd)
    }
}

/// POSIX shared-memory fallback for non-Linux unixes.
#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
fn memory_fd(len: usize) -> Result<OwnedFd> {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let name = format!(
        "/caudal-{}-{}\0",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    );
    // SAFETY: shm_open/shm_unlink with a NUL-terminated unique name.
    unsafe {
        let fd = libc::shm_open(
            name.as_ptr() as *const libc::c_char,
            libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
            0o600,
        );
        if fd < 0 {
            return Err(map_error("shm_open"));
        }
        libc::shm_unlink(name.as_ptr() as *const libc::c_char);
        let fd = OwnedFd::from_raw_fd(fd);
        if libc::ftruncate(std::os::fd::AsRawFd::as_raw_fd(&fd), len as libc::off_t) != 0 {
            return Err(map_error("ftruncate"));
        }
        Ok(fd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_rounds_to_page_size() {
        let page = page_size();
        let region = DoubleMappedRegion::new(1).unwrap();
        assert_eq!(region.len(), page);
        let region = DoubleMappedRegion::new(page + 1).unwrap();
        assert_eq!(region.len(), 2 * page);
    }

    #[test]
    fn second_mapping_mirrors_the_first() {
        let region = DoubleMappedRegion::new(page_size()).unwrap();
        let n = region.len();
        let ptr = region.as_ptr();
        // SAFETY: region maps 2*n valid bytes; single-threaded access here.
        unsafe {
            for i in 0..n {
                ptr.add(i).write((i % 251) as u8);
            }
            for i in 0..n {
                assert_eq!(ptr.add(n + i).read(), (i % 251) as u8);
            }
            // writes through the mirror land in the first mapping too
            ptr.add(n).write(0xAB);
            assert_eq!(ptr.read(), 0xAB);
        }
    }

    #[test]
    fn aligned_capacity_honours_stride() {
        let page = 4096;
        assert_eq!(aligned_capacity(1, 4, page), 1024);
        assert_eq!(aligned_capacity(1024, 4, page), 1024);
        assert_eq!(aligned_capacity(1025, 4, page), 2048);
        // 24-byte stride: period is page / gcd(24, 4096) = 512 elements
        assert_eq!(aligned_capacity(100, 24, page), 512);
        assert_eq!(aligned_capacity(513, 24, page) % 512, 0);
    }
}
