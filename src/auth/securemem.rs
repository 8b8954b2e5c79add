#![cfg_attr(not(any(feature = "pam", feature = "shadow")), allow(dead_code))]
//! Routines for "secure" memory operations; i.e. passwords that we need to
//! hand to authentication backends and don't want any copies to leak (that
//! we would then need to zeroize).
use std::{
    alloc::{self, Layout},
    mem,
    ptr::NonNull,
    slice,
};

/// Large enough for any response a PAM module may legally expect
/// (PAM_MAX_RESP_SIZE).
const SIZE: usize = 512;
const ALIGN: usize = mem::align_of::<u8>();

pub struct PasswordBuffer(NonNull<[u8; SIZE]>);

fn layout() -> Layout {
    // does not panic with the given arguments; also see unit test at the bottom
    Layout::from_size_align(SIZE, ALIGN).unwrap()
}

impl PasswordBuffer {
    /// Consume this buffer and return its internal pointer
    /// (ending the type-level security, but guaranteeing you need unsafe code
    /// to access the data; the receiver also becomes responsible for freeing)
    #[cfg(feature = "pam")]
    pub fn leak(self) -> NonNull<u8> {
        let result = self.0;
        std::mem::forget(self);

        result.cast()
    }

    #[cfg(test)]
    pub fn new(mut src: impl AsMut<[u8]>) -> Self {
        let mut buffer = PasswordBuffer::default();
        let src = src.as_mut();
        buffer[..src.len()].copy_from_slice(src);
        wipe_memory(src);

        buffer
    }
}

impl Default for PasswordBuffer {
    fn default() -> Self {
        // SAFETY: calloc returns either a valid zeroed allocation or NULL
        let res = unsafe { libc::calloc(1, SIZE) };
        if let Some(nn) = NonNull::new(res) {
            PasswordBuffer(nn.cast())
        } else {
            alloc::handle_alloc_error(layout())
        }
    }
}

impl std::ops::Deref for PasswordBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // make the slice one less in size to guarantee the existence of a terminating NUL
        // SAFETY: the pointer is valid for SIZE bytes by construction
        unsafe { slice::from_raw_parts(self.0.as_ptr().cast(), SIZE - 1) }
    }
}

impl std::ops::DerefMut for PasswordBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above
        unsafe { slice::from_raw_parts_mut(self.0.as_ptr().cast(), SIZE - 1) }
    }
}

impl Drop for PasswordBuffer {
    fn drop(&mut self) {
        // SAFETY: the allocation is still live and SIZE bytes large
        wipe_memory(unsafe { self.0.as_mut() });
        // SAFETY: the pointer came from calloc and was not freed before
        unsafe { libc::free(self.0.as_ptr().cast()) }
    }
}

/// Used to zero out memory and protect sensitive data from leaking;
/// the write must go through a volatile pointer or it may be optimized out.
fn wipe_memory(memory: &mut [u8]) {
    use std::sync::atomic;

    let nonsense: u8 = 0x55;
    for c in memory {
        // SAFETY: `c` is a valid exclusive reference into the buffer
        unsafe { std::ptr::write_volatile(c, nonsense) };
    }

    atomic::fence(atomic::Ordering::SeqCst);
    atomic::compiler_fence(atomic::Ordering::SeqCst);
}

#[cfg(test)]
mod test {
    use super::PasswordBuffer;

    #[test]
    fn miri_test_wipe() {
        let mut memory: [u8; 3] = [1, 2, 3];
        let fix = PasswordBuffer::new(&mut memory);
        assert_eq!(memory, [0x55, 0x55, 0x55]);
        assert_eq!(fix[0..=2], [1, 2, 3]);
        assert!(fix[3..].iter().all(|&x| x == 0));
        std::mem::drop(fix);
    }

    #[cfg(feature = "pam")]
    #[test]
    fn miri_test_leaky_cstring() {
        let test = |text: &str| unsafe {
            let buf = PasswordBuffer::new(text.to_string().as_bytes_mut());
            assert_eq!(&buf[..text.len()], text.as_bytes());
            let nn = buf.leak();
            let result = crate::cutils::string_from_ptr(nn.as_ptr().cast());
            libc::free(nn.as_ptr().cast());
            result
        };
        assert_eq!(test(""), "");
        assert_eq!(test("hello"), "hello");
    }
}
