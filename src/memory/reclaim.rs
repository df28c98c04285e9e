//! Returning freed heap memory to the operating system.
//!
//! Rust frees memory deterministically, but glibc's allocator keeps freed
//! pages in its arenas. `malloc_trim` hands them back, which is the closest
//! analogue to a collection pass. Other platforms have no equivalent call.

/// Release free allocator memory. Returns `true` if anything was released.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub fn release_free_memory() -> bool {
    // SAFETY: malloc_trim only walks allocator-internal state and takes no pointers.
    unsafe { libc::malloc_trim(0) != 0 }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub fn release_free_memory() -> bool {
    false
}
