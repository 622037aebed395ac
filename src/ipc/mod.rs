//! A library wrapping various IPC mechanisms with a datagram-oriented
//! messaging layer. This is how CCP communicates with the datapath.

use std::sync::{atomic, Arc, Weak};

use tracing::{trace, warn};

use crate::serialize::{Msg, MAX_MSG_LEN};
use crate::{Error, Result};

/// Thread-channel implementation
pub mod chan;
#[cfg(target_os = "linux")]
/// Character device implementation
pub mod kp;
#[cfg(target_os = "linux")]
/// Netlink socket implementation
pub mod netlink;
/// Unix domain socket implementation
pub mod unix;

/// IPC mechanisms must implement this trait.
pub trait Ipc: 'static + Send {
    /// Returns the name of this IPC mechanism (e.g. "netlink" for Linux netlink sockets)
    fn name() -> String;
    /// Send one frame. Must not block on the datapath.
    fn send(&self, msg: &[u8]) -> Result<()>;
    /// Listen for one datagram. Return value is how many bytes were read; 0 means
    /// nothing arrived before the timeout. A closed channel is `Err(ChannelClosed)`.
    /// Should not allocate.
    fn recv(&self, msg: &mut [u8]) -> Result<usize>;
    /// Close the underlying sockets
    fn close(&mut self) -> Result<()>;
}

/// Marker type specifying that the IPC socket should make blocking calls to the underlying socket
pub struct Blocking;
/// Marker type specifying that the IPC socket should make nonblocking calls to the underlying socket
pub struct Nonblocking;

/// Backend builder contains the objects
/// needed to build a new backend.
pub struct BackendBuilder<T: Ipc> {
    pub sock: T,
}

impl<T: Ipc> BackendBuilder<T> {
    pub fn build(self, atomic_bool: Arc<atomic::AtomicBool>) -> Backend<T> {
        Backend::new(self.sock, atomic_bool)
    }
}

/// A send-only handle to the underlying IPC socket.
pub struct BackendSender<T: Ipc>(Weak<T>);

impl<T: Ipc> BackendSender<T> {
    pub fn send_msg(&self, msg: &[u8]) -> Result<()> {
        let s = Weak::upgrade(&self.0).ok_or(Error::ChannelClosed)?;
        s.send(msg)
    }
}

impl<T: Ipc> Clone for BackendSender<T> {
    fn clone(&self) -> Self {
        BackendSender(self.0.clone())
    }
}

/// Backend will yield incoming IPC messages via `next()` until the channel
/// closes or the stop flag is cleared.
/// It owns the socket; `BackendSender` holds weak references.
pub struct Backend<T: Ipc> {
    sock: Arc<T>,
    continue_listening: Arc<atomic::AtomicBool>,
    receive_buf: [u8; MAX_MSG_LEN],
    tot_read: usize,
    read_until: usize,
    malformed: u64,
    resyncing: bool,
    error: Option<Error>,
}

impl<T: Ipc> Backend<T> {
    pub fn new(sock: T, continue_listening: Arc<atomic::AtomicBool>) -> Self {
        Backend {
            sock: Arc::new(sock),
            continue_listening,
            receive_buf: [0u8; MAX_MSG_LEN],
            tot_read: 0,
            read_until: 0,
            malformed: 0,
            resyncing: false,
            error: None,
        }
    }

    pub fn sender(&self) -> BackendSender<T> {
        BackendSender(Arc::downgrade(&self.sock))
    }

    /// Return a copy of the flag variable that indicates that the
    /// `Backend` should continue listening (i.e., not exit).
    pub fn clone_atomic_bool(&self) -> Arc<atomic::AtomicBool> {
        Arc::clone(&self.continue_listening)
    }

    /// Number of garbage runs skipped so far. Consecutive bad bytes count once.
    pub fn malformed_frames(&self) -> u64 {
        self.malformed
    }

    /// Why the last `next()` returned `None`, if it was not a requested stop.
    pub fn take_error(&mut self) -> Option<Error> {
        self.error.take()
    }

    /// Get the next IPC message.
    ///
    /// Returns `None` once the stop flag is cleared or the socket fails; see
    /// `take_error`. Bytes which do not parse as a frame are skipped one at a time
    /// until a frame does.
    // This is similar to `impl Iterator`, but we want the caller to be able to
    // inspect the backend between messages.
    pub fn next(&mut self) -> Option<Msg> {
        loop {
            if self.read_until >= self.tot_read {
                match self.get_next_read() {
                    Ok(Some(read)) => {
                        self.tot_read = read;
                        self.read_until = 0;
                        self.resyncing = false;
                    }
                    Ok(None) => return None,
                    Err(e) => {
                        self.error = Some(e);
                        return None;
                    }
                }
            }

            match Msg::from_buf(&self.receive_buf[self.read_until..self.tot_read]) {
                Ok((msg, consumed)) => {
                    self.read_until += consumed;
                    self.resyncing = false;
                    return Some(msg);
                }
                Err(Error::MalformedFrame(reason)) => {
                    if !self.resyncing {
                        self.malformed += 1;
                        self.resyncing = true;
                        warn!(
                            ipc = %T::name(),
                            offset = self.read_until,
                            %reason,
                            "skipping malformed bytes"
                        );
                    }

                    self.read_until += 1;
                }
                Err(e) => {
                    self.error = Some(e);
                    return None;
                }
            }
        }
    }

    // Calls IPC repeatedly until a datagram arrives.
    // Returns how much of self.receive_buf it filled, or None if asked to stop.
    fn get_next_read(&mut self) -> Result<Option<usize>> {
        loop {
            // if continue_loop has been set to false, stop iterating
            if !self.continue_listening.load(atomic::Ordering::SeqCst) {
                return Ok(None);
            }

            let read = self.sock.recv(&mut self.receive_buf)?;
            if read == 0 {
                continue;
            }

            trace!(ipc = %T::name(), bytes = read, "read");
            return Ok(Some(read));
        }
    }
}

impl<T: Ipc> Drop for Backend<T> {
    fn drop(&mut self) {
        let closed = Arc::get_mut(&mut self.sock)
            .ok_or_else(|| Error::Ipc(String::from("could not get exclusive ref to socket to close")))
            .and_then(Ipc::close);
        if let Err(e) = closed {
            warn!(ipc = %T::name(), err = %e, "close failed");
        }
    }
}
