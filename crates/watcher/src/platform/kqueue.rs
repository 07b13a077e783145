//! kqueue backend (macOS and the BSDs)
//!
//! Each watched path is opened in events-only mode and registered as an
//! `EVFILT_VNODE` knote with `EV_CLEAR`, so the kernel resets the knote after
//! reporting it and folds repeated changes into one report. Closing the
//! descriptor removes the knote.

use super::{open_failed, path_to_cstring, register_failed, Descriptor, RawBatch, RawEvent, BATCH_SIZE};
use kwatch_core::{Notification, WatchError};
use nix::errno::Errno;
use parking_lot::Mutex;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::ptr;

/// Open mode that does not keep the target's volume from unmounting
#[cfg(target_vendor = "apple")]
const EVENTS_ONLY: libc::c_int = libc::O_EVTONLY;

#[cfg(not(target_vendor = "apple"))]
const EVENTS_ONLY: libc::c_int = libc::O_RDONLY;

/// An armed vnode knote, owning the descriptor it is attached to
#[derive(Debug)]
pub(crate) struct Watch {
    fd: OwnedFd,
}

impl Watch {
    pub fn descriptor(&self) -> Descriptor {
        Descriptor::from_raw(self.fd.as_raw_fd())
    }
}

/// The kqueue descriptor
pub(crate) struct KernelQueue {
    kq: Mutex<Option<OwnedFd>>,
    #[cfg(test)]
    injected: Mutex<Option<Errno>>,
}

impl KernelQueue {
    pub fn new() -> io::Result<Self> {
        // SAFETY: kqueue() takes no arguments and returns a new descriptor or -1
        let kq = unsafe { libc::kqueue() };
        if kq < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: `kq` is a freshly created descriptor nobody else owns
        let kq = unsafe { OwnedFd::from_raw_fd(kq) };
        Ok(Self {
            kq: Mutex::new(Some(kq)),
            #[cfg(test)]
            injected: Mutex::new(None),
        })
    }

    pub fn arm(&self, path: &Path, notifications: Notification) -> Result<Watch, WatchError> {
        let kq = self.kq.lock();
        let Some(kq) = kq.as_ref() else {
            return Err(register_failed(path, Errno::EBADF));
        };

        let c_path = path_to_cstring(path)?;
        // SAFETY: `c_path` is a valid NUL-terminated string for the whole call
        let fd = unsafe { libc::open(c_path.as_ptr(), EVENTS_ONLY | libc::O_CLOEXEC) };
        if fd < 0 {
            return Err(open_failed(path, Errno::last()));
        }
        // SAFETY: `fd` was just returned by open() and is owned by nobody else
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        // SAFETY: kevent is plain data; zero is valid for every field, including
        // the platform-specific extension fields we leave unset
        let mut change: libc::kevent = unsafe { mem::zeroed() };
        change.ident = fd.as_raw_fd() as libc::uintptr_t;
        change.filter = libc::EVFILT_VNODE;
        change.flags = libc::EV_ADD | libc::EV_ENABLE | libc::EV_CLEAR;
        change.fflags = notifications.bits();

        // SAFETY: one valid change record, no event list, null timeout
        let rc = unsafe {
            libc::kevent(
                kq.as_raw_fd(),
                &change,
                1,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        };
        if rc < 0 {
            let errno = Errno::last();
            drop(fd);
            return Err(register_failed(path, errno));
        }

        Ok(Watch { fd })
    }

    pub fn disarm(&self, watch: Watch) {
        // Closing the descriptor deletes its knote
        drop(watch);
    }

    /// Pull up to `BATCH_SIZE` reports without waiting
    ///
    /// Returns how many reports the kernel handed over; zero means drained.
    pub fn poll(&self, batch: &mut RawBatch) -> Result<usize, Errno> {
        if let Some(errno) = self.take_injected() {
            return Err(errno);
        }

        let kq = self.kq.lock();
        let Some(kq) = kq.as_ref() else {
            return Ok(0);
        };

        // SAFETY: see `arm`
        let mut events: [libc::kevent; BATCH_SIZE] = unsafe { mem::zeroed() };
        let zero = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };

        // SAFETY: `events` has room for BATCH_SIZE records and outlives the call
        let received = unsafe {
            libc::kevent(
                kq.as_raw_fd(),
                ptr::null(),
                0,
                events.as_mut_ptr(),
                BATCH_SIZE as _,
                &zero,
            )
        };
        if received < 0 {
            return Err(Errno::last());
        }

        let received = received as usize;
        batch.extend(
            events[..received]
                .iter()
                .filter(|event| event.filter == libc::EVFILT_VNODE && event.flags & libc::EV_ERROR == 0)
                .map(|event| RawEvent {
                    descriptor: Descriptor::from_raw(event.ident as RawFd),
                    notification: Notification::from_bits_truncate(event.fflags),
                }),
        );
        Ok(received)
    }

    /// Make the next `poll` fail with `errno`
    #[cfg(test)]
    pub fn fail_next_poll(&self, errno: Errno) {
        *self.injected.lock() = Some(errno);
    }

    #[cfg(test)]
    fn take_injected(&self) -> Option<Errno> {
        self.injected.lock().take()
    }

    #[cfg(not(test))]
    fn take_injected(&self) -> Option<Errno> {
        None
    }

    /// Close the kqueue descriptor; true on the first call
    pub fn close(&self) -> bool {
        self.kq.lock().take().is_some()
    }
}
