//! Memory protection for plaintext key material
//!
//! Two hardening measures:
//!
//! 1. **Core dump prevention**: `setrlimit(RLIMIT_CORE, 0)` so a crash in the
//!    middle of a convert or pubkey never writes a private key to disk.
//!
//! 2. **Locked secret buffers**: [`SecretBytes`] takes ownership of a byte
//!    vector, `mlock()`s its heap allocation and zeroizes it on drop.
//!
//! Both are best-effort. Containers and unprivileged users often cannot lock
//! memory, so failures are logged and the operation carries on.
//!
//! Locks are per page and not counted. Two small buffers usually share a
//! page, so dropping one unlocks the page under the other while it is still
//! alive. Its bytes are still zeroized on drop; only swap protection lapses.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use zeroize::Zeroize;

static CORE_DUMPS_DISABLED: AtomicBool = AtomicBool::new(false);

/// Disable core dumps for the current process.
///
/// Call once at startup, before any key material is loaded. Returns `true`
/// if core dumps are disabled (including by an earlier call).
pub fn disable_core_dumps() -> bool {
    if CORE_DUMPS_DISABLED.swap(true, Ordering::SeqCst) {
        return true;
    }

    #[cfg(unix)]
    {
        unix::disable_core_dumps_impl()
    }

    #[cfg(not(unix))]
    {
        log::warn!("core dump prevention is not supported on this platform");
        false
    }
}

/// Owned plaintext bytes that are locked in RAM and wiped on drop.
///
/// Used for every plaintext private key that passes through the workflows:
/// legacy decryption output, KMS decryption output and serialized keys on
/// their way into the KMS.
pub struct SecretBytes {
    data: Vec<u8>,
    locked: bool,
}

impl SecretBytes {
    /// Take ownership of `data` and lock its allocation.
    ///
    /// The vector is shrunk first so the locked region covers the whole
    /// allocation and nothing is reallocated behind our back.
    pub fn new(mut data: Vec<u8>) -> Self {
        data.shrink_to_fit();
        let locked = if data.is_empty() {
            true
        } else {
            // SAFETY: `data` is a live allocation of `data.len()` bytes and is
            // unlocked in `Drop` before it is freed.
            unsafe { mlock(data.as_ptr(), data.len()) }
        };
        if !locked {
            log::debug!("mlock of {} secret bytes failed; buffer may be swappable", data.len());
        }
        Self { data, locked }
    }

    /// Copy `bytes` into a new locked buffer.
    pub fn copy_from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the memory is actually locked.
    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl AsRef<[u8]> for SecretBytes {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretBytes")
            .field("len", &self.data.len())
            .field("data", &"***SECRET***")
            .finish()
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        // Zeroize clears the vector, so capture the region first.
        let ptr = self.data.as_ptr();
        let len = self.data.len();
        self.data.zeroize();

        if self.locked && len > 0 {
            // SAFETY: same region that was locked in `new`; the allocation is
            // still alive because `zeroize` does not free it.
            unsafe {
                munlock(ptr, len);
            }
        }
    }
}

/// Lock a memory region so it is never swapped to disk.
///
/// # Safety
///
/// `ptr` must point to a live allocation of at least `len` bytes, which must
/// be unlocked with [`munlock`] before it is freed.
unsafe fn mlock(ptr: *const u8, len: usize) -> bool {
    #[cfg(unix)]
    {
        unix::mlock_impl(ptr, len)
    }

    #[cfg(not(unix))]
    {
        let _ = (ptr, len);
        false
    }
}

/// Unlock a region previously locked with [`mlock`].
///
/// # Safety
///
/// `ptr` and `len` must match an earlier successful `mlock` call.
unsafe fn munlock(ptr: *const u8, len: usize) -> bool {
    #[cfg(unix)]
    {
        unix::munlock_impl(ptr, len)
    }

    #[cfg(not(unix))]
    {
        let _ = (ptr, len);
        true
    }
}

#[cfg(unix)]
mod unix {
    pub fn disable_core_dumps_impl() -> bool {
        let rlim = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: setrlimit reads a fully initialised rlimit struct.
        let result = unsafe { libc::setrlimit(libc::RLIMIT_CORE, &rlim) };
        if result != 0 {
            log::warn!(
                "failed to disable core dumps: {}",
                std::io::Error::last_os_error()
            );
            return false;
        }
        true
    }

    pub unsafe fn mlock_impl(ptr: *const u8, len: usize) -> bool {
        libc::mlock(ptr as *const libc::c_void, len) == 0
    }

    pub unsafe fn munlock_impl(ptr: *const u8, len: usize) -> bool {
        libc::munlock(ptr as *const libc::c_void, len) == 0
    }
}
