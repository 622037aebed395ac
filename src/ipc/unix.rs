use std::io::ErrorKind;
use std::marker::PhantomData;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{Blocking, Nonblocking};
use crate::{Error, Result};

/// The name CCP binds to.
pub const CCP_SOCK: &str = "in";
/// The name the datapath binds to.
pub const DP_SOCK: &str = "out";

const SOCK_DIR: &str = "/tmp/ccp";

macro_rules! sock_path {
    ($x:expr) => {
        PathBuf::from(format!("{}/{}", SOCK_DIR, $x))
    };
}

fn unlink(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(Error::from(e)),
        _ => Ok(()),
    }
}

/// A Unix datagram socket bound at `/tmp/ccp/<bind_to>`, sending to `/tmp/ccp/<send_to>`.
pub struct Socket<T> {
    sk: UnixDatagram,
    tx: UnixDatagram,
    bound: PathBuf,
    peer: PathBuf,
    _phantom: PhantomData<T>,
}

impl<T> Socket<T> {
    fn __new(bind_to: &str, send_to: &str) -> Result<Self> {
        std::fs::create_dir_all(SOCK_DIR)?;

        let bound = sock_path!(bind_to);
        // unlink before bind
        unlink(&bound)?;

        let sk = UnixDatagram::bind(&bound)?;
        let tx = UnixDatagram::unbound()?;
        tx.set_nonblocking(true)?;

        Ok(Socket {
            sk,
            tx,
            bound,
            peer: sock_path!(send_to),
            _phantom: PhantomData,
        })
    }
}

impl<T: 'static + Send> super::Ipc for Socket<T> {
    fn name() -> String {
        String::from("unix")
    }

    fn send(&self, msg: &[u8]) -> Result<()> {
        self.tx
            .send_to(msg, &self.peer)
            .map(|_| ())
            .map_err(Error::from)
    }

    fn recv(&self, msg: &mut [u8]) -> Result<usize> {
        match self.sk.recv(msg) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                Ok(0)
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(Error::from(e)),
        }
    }

    fn close(&mut self) -> Result<()> {
        unlink(&self.bound)
    }
}

impl Socket<Blocking> {
    pub fn new(bind_to: &str, send_to: &str) -> Result<Self> {
        let sk = Socket::__new(bind_to, send_to)?;
        sk.sk.set_read_timeout(Some(Duration::from_secs(1)))?;
        Ok(sk)
    }
}

impl Socket<Nonblocking> {
    pub fn new(bind_to: &str, send_to: &str) -> Result<Self> {
        let sk = Socket::__new(bind_to, send_to)?;
        sk.sk.set_nonblocking(true)?;
        Ok(sk)
    }
}
