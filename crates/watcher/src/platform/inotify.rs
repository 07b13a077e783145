//! inotify backend (Linux and Android)
//!
//! inotify has no vnode filter, so this backend maps kinds onto inotify
//! masks and back:
//! - `WRITE`/`EXTEND` arm `IN_MODIFY`, reported as both
//! - `WRITE`/`LINK` arm directory entry changes (`IN_CREATE`, `IN_DELETE`,
//!   `IN_MOVED_*`), reported as `WRITE`, plus `LINK` for subdirectories
//! - `ATTRIB`/`LINK` arm `IN_ATTRIB`, reported as `ATTRIB`, plus `LINK` when
//!   the target's link count moved since the last report (counted only for
//!   watches armed with `LINK`)
//! - `DELETE` arms `IN_DELETE_SELF`, `RENAME` arms `IN_MOVE_SELF`
//! - `IN_UNMOUNT` is always delivered and reported as `REVOKE`
//!
//! Reports wider than what was armed are narrowed by the monitor loop.
//! inotify queues every change separately; reports are folded per watch
//! descriptor into the caller's batch, across reads, which is what a kqueue
//! knote does on its own. One read takes as many records as fit in a buffer
//! sized for `BATCH_SIZE` maximal records, so a call may return more than
//! `BATCH_SIZE` short ones.

use super::{open_failed, path_to_cstring, register_failed, Descriptor, RawBatch, RawEvent, BATCH_SIZE};
use ahash::AHashMap;
use kwatch_core::{Notification, WatchError};
use nix::errno::Errno;
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::ptr;
use tracing::warn;

/// Fail instead of merging masks when the inode is already watched (Linux 4.18+)
const IN_MASK_CREATE: u32 = 0x1000_0000;

/// Changes to a directory's entries
const ENTRY_CHANGES: u32 = libc::IN_CREATE | libc::IN_DELETE | libc::IN_MOVED_FROM | libc::IN_MOVED_TO;

const HEADER_LEN: usize = mem::size_of::<libc::inotify_event>();

const NAME_MAX: usize = 255;

/// Room for `BATCH_SIZE` events carrying a maximal file name
const READ_BUFFER_LEN: usize = BATCH_SIZE * (HEADER_LEN + NAME_MAX + 1);

/// An armed inotify watch
#[derive(Debug)]
pub(crate) struct Watch {
    wd: libc::c_int,
}

impl Watch {
    pub fn descriptor(&self) -> Descriptor {
        Descriptor::from_raw(self.wd)
    }
}

/// Last seen link count of a watch armed with `LINK`
#[derive(Debug)]
struct LinkCount {
    path: PathBuf,
    nlink: u64,
}

/// The inotify instance
pub(crate) struct KernelQueue {
    fd: Mutex<Option<OwnedFd>>,
    links: Mutex<AHashMap<libc::c_int, LinkCount>>,
    #[cfg(test)]
    injected: Mutex<Option<Errno>>,
}

impl KernelQueue {
    pub fn new() -> io::Result<Self> {
        // SAFETY: plain syscall with constant flags
        let fd = unsafe { libc::inotify_init1(libc::IN_NONBLOCK | libc::IN_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: `fd` is a freshly created descriptor nobody else owns
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self {
            fd: Mutex::new(Some(fd)),
            links: Mutex::new(AHashMap::new()),
            #[cfg(test)]
            injected: Mutex::new(None),
        })
    }

    pub fn arm(&self, path: &Path, notifications: Notification) -> Result<Watch, WatchError> {
        let fd = self.fd.lock();
        let Some(fd) = fd.as_ref() else {
            return Err(register_failed(path, Errno::EBADF));
        };

        let c_path = path_to_cstring(path)?;

        // O_PATH only resolves the target: it cannot read it, and it is
        // closed right after the watch is added so it never holds the inode
        // past an unlink.
        // SAFETY: `c_path` is a valid NUL-terminated string for the whole call
        let probe = unsafe { libc::open(c_path.as_ptr(), libc::O_PATH | libc::O_CLOEXEC) };
        if probe < 0 {
            return Err(open_failed(path, Errno::last()));
        }
        // SAFETY: `probe` was just returned by open() and is owned by nobody else
        let probe = unsafe { OwnedFd::from_raw_fd(probe) };

        let mask = to_inotify_mask(notifications) | IN_MASK_CREATE;
        // SAFETY: valid inotify descriptor and NUL-terminated path
        let wd = unsafe { libc::inotify_add_watch(fd.as_raw_fd(), c_path.as_ptr(), mask) };
        let errno = Errno::last();
        drop(probe);

        if wd < 0 {
            return Err(register_failed(path, errno));
        }

        if notifications.contains(Notification::LINK) {
            if let Ok(metadata) = fs::metadata(path) {
                self.links.lock().insert(
                    wd,
                    LinkCount {
                        path: path.to_path_buf(),
                        nlink: metadata.nlink(),
                    },
                );
            }
        }
        Ok(Watch { wd })
    }

    pub fn disarm(&self, watch: Watch) {
        let fd = self.fd.lock();
        self.links.lock().remove(&watch.wd);
        let Some(fd) = fd.as_ref() else {
            return;
        };

        // SAFETY: plain syscall on descriptors we own
        if unsafe { libc::inotify_rm_watch(fd.as_raw_fd(), watch.wd) } < 0 {
            // EINVAL: the kernel already dropped the watch (target deleted)
            let errno = Errno::last();
            if errno != Errno::EINVAL {
                warn!(wd = watch.wd, %errno, "failed to remove inotify watch");
            }
        }
    }

    /// Read one buffer of reports without waiting
    ///
    /// Returns how many reports the kernel handed over; zero means drained.
    pub fn poll(&self, batch: &mut RawBatch) -> Result<usize, Errno> {
        if let Some(errno) = self.take_injected() {
            return Err(errno);
        }

        let mut buffer = [0u8; READ_BUFFER_LEN];
        let read = {
            let fd = self.fd.lock();
            let Some(fd) = fd.as_ref() else {
                return Ok(0);
            };
            // SAFETY: `buffer` is writable for its whole length
            unsafe { libc::read(fd.as_raw_fd(), buffer.as_mut_ptr().cast(), buffer.len()) }
        };

        if read < 0 {
            return match Errno::last() {
                Errno::EAGAIN => Ok(0),
                errno => Err(errno),
            };
        }

        let read = read as usize;
        let mut offset = 0;
        let mut reports = 0;
        while offset + HEADER_LEN <= read {
            // SAFETY: the kernel only writes whole events, so a full header
            // starts at `offset`; the buffer has no alignment guarantee
            let event: libc::inotify_event =
                unsafe { ptr::read_unaligned(buffer.as_ptr().add(offset).cast()) };
            offset += HEADER_LEN + event.len as usize;
            reports += 1;

            if let Some(mut raw) = translate(&event) {
                if event.mask & libc::IN_ATTRIB != 0 && event.len == 0 && self.link_count_moved(event.wd) {
                    raw.notification |= Notification::LINK;
                }
                fold(batch, raw);
            }
        }
        Ok(reports)
    }

    /// Re-read the link count of a watch armed with `LINK`
    ///
    /// A target that can no longer be found counts as zero links.
    fn link_count_moved(&self, wd: libc::c_int) -> bool {
        let mut links = self.links.lock();
        let Some(tracked) = links.get_mut(&wd) else {
            return false;
        };
        let nlink = fs::metadata(&tracked.path).map_or(0, |metadata| metadata.nlink());
        if nlink == tracked.nlink {
            return false;
        }
        tracked.nlink = nlink;
        true
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

    /// Close the inotify descriptor; true on the first call
    pub fn close(&self) -> bool {
        self.fd.lock().take().is_some()
    }
}

fn to_inotify_mask(notifications: Notification) -> u32 {
    let mut mask = 0;
    if notifications.intersects(Notification::WRITE | Notification::EXTEND) {
        mask |= libc::IN_MODIFY;
    }
    if notifications.intersects(Notification::WRITE | Notification::LINK) {
        mask |= ENTRY_CHANGES;
    }
    if notifications.intersects(Notification::ATTRIB | Notification::LINK) {
        mask |= libc::IN_ATTRIB;
    }
    if notifications.contains(Notification::DELETE) {
        mask |= libc::IN_DELETE_SELF;
    }
    if notifications.contains(Notification::RENAME) {
        mask |= libc::IN_MOVE_SELF;
    }
    if mask == 0 {
        // inotify rejects a mask without event bits; reports are narrowed to
        // the armed set later, so this placeholder never surfaces
        mask = libc::IN_DELETE_SELF;
    }
    mask
}

/// `names_child` is set when the report is about an entry inside a watched
/// directory rather than the watched path itself
fn from_inotify_mask(mask: u32, names_child: bool) -> Notification {
    let mut notification = Notification::empty();
    if mask & libc::IN_MODIFY != 0 && !names_child {
        notification |= Notification::WRITE | Notification::EXTEND;
    }
    if mask & ENTRY_CHANGES != 0 {
        notification |= Notification::WRITE;
        if mask & libc::IN_ISDIR != 0 {
            notification |= Notification::LINK;
        }
    }
    if mask & libc::IN_ATTRIB != 0 && !names_child {
        notification |= Notification::ATTRIB;
    }
    if mask & libc::IN_DELETE_SELF != 0 {
        notification |= Notification::DELETE;
    }
    if mask & libc::IN_MOVE_SELF != 0 {
        notification |= Notification::RENAME;
    }
    if mask & libc::IN_UNMOUNT != 0 {
        notification |= Notification::REVOKE;
    }
    notification
}

fn translate(event: &libc::inotify_event) -> Option<RawEvent> {
    if event.mask & libc::IN_Q_OVERFLOW != 0 {
        warn!("inotify queue overflowed, change reports were dropped");
        return None;
    }
    if event.wd < 0 || event.mask & libc::IN_IGNORED != 0 {
        return None;
    }

    let notification = from_inotify_mask(event.mask, event.len > 0);
    if notification.is_empty() {
        return None;
    }
    Some(RawEvent {
        descriptor: Descriptor::from_raw(event.wd),
        notification,
    })
}

/// Merge `raw` into the report already queued for its descriptor, if any
fn fold(batch: &mut RawBatch, raw: RawEvent) {
    match batch.iter_mut().find(|queued| queued.descriptor == raw.descriptor) {
        Some(queued) => queued.notification |= raw.notification,
        None => batch.push(raw),
    }
}
