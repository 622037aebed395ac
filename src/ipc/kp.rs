use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::marker::PhantomData;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::sync::Mutex;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};

use super::{Blocking, Nonblocking};
use crate::{Error, Result};

const CCPKP_DEV: &str = "/dev/ccpkp";

/// The ccp-kernel character device.
pub struct Socket<T> {
    r: Mutex<File>,
    w: Mutex<File>,
    _phantom: PhantomData<T>,
}

fn lock_poisoned<E>(_: E) -> Error {
    Error::Ipc(String::from("char device lock poisoned"))
}

impl<T> Socket<T> {
    fn __new(options: &OpenOptions) -> Result<Self> {
        let rfd = options.open(CCPKP_DEV)?;
        let wfd = rfd.try_clone()?;
        Ok(Socket {
            r: Mutex::new(rfd),
            w: Mutex::new(wfd),
            _phantom: PhantomData,
        })
    }

    fn __send(&self, buf: &[u8]) -> Result<()> {
        let mut f = self.w.lock().map_err(lock_poisoned)?;
        f.write_all(buf).map_err(Error::from)
    }

    fn __read(f: &mut File, msg: &mut [u8]) -> Result<usize> {
        match f.read(msg) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                Ok(0)
            }
            Err(e) => Err(Error::from(e)),
        }
    }
}

impl super::Ipc for Socket<Blocking> {
    fn name() -> String {
        String::from("char")
    }

    fn send(&self, buf: &[u8]) -> Result<()> {
        self.__send(buf)
    }

    fn recv(&self, msg: &mut [u8]) -> Result<usize> {
        let mut f = self.r.lock().map_err(lock_poisoned)?;
        let mut fds = [PollFd::new(f.as_raw_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, 1000) {
            Ok(0) | Err(Errno::EINTR) => return Ok(0),
            Ok(_) => (),
            Err(e) => return Err(Error::from(e)),
        }

        Self::__read(&mut f, msg)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl super::Ipc for Socket<Nonblocking> {
    fn name() -> String {
        String::from("char")
    }

    fn send(&self, buf: &[u8]) -> Result<()> {
        self.__send(buf)
    }

    fn recv(&self, msg: &mut [u8]) -> Result<usize> {
        let mut f = self.r.lock().map_err(lock_poisoned)?;
        Self::__read(&mut f, msg)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Socket<Blocking> {
    pub fn new() -> Result<Self> {
        let mut options = OpenOptions::new();
        options.write(true).read(true);
        Self::__new(&options)
    }
}

impl Socket<Nonblocking> {
    pub fn new() -> Result<Self> {
        let mut options = OpenOptions::new();
        options.write(true).read(true).custom_flags(libc::O_NONBLOCK);
        Self::__new(&options)
    }
}
