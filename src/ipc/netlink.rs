use std::marker::PhantomData;
use std::mem;
use std::os::unix::io::RawFd;

use libc::c_int;
use nix::errno::Errno;
use nix::sys::socket;
use nix::sys::socket::{AddressFamily, MsgFlags, SockAddr, SockFlag, SockProtocol, SockType};

use super::{Blocking, Nonblocking};
use crate::serialize::{u32_to_u8s, MAX_MSG_LEN};
use crate::{Error, Result};

pub struct Socket<T>(RawFd, PhantomData<T>);

const NL_CFG_F_NONROOT_RECV: c_int = 1;
const NL_CFG_F_NONROOT_SEND: c_int = 1 << 1;
const NLMSG_HDRSIZE: usize = 0x10;
const SOL_NETLINK: c_int = 270;
const CCP_MULTICAST_GROUP: c_int = 22;

impl<T> Socket<T> {
    fn __new() -> Result<Self> {
        let fd = match socket::socket(
            AddressFamily::Netlink,
            SockType::Raw,
            SockFlag::empty(),
            SockProtocol::NetlinkUserSock,
        ) {
            Ok(fd) => fd,
            Err(_) => socket::socket(
                AddressFamily::Netlink,
                SockType::Raw,
                SockFlag::from_bits_truncate(NL_CFG_F_NONROOT_RECV)
                    | SockFlag::from_bits_truncate(NL_CFG_F_NONROOT_SEND),
                SockProtocol::NetlinkUserSock,
            )?,
        };

        let pid = nix::unistd::getpid().as_raw();
        socket::bind(fd, &SockAddr::new_netlink(pid as u32, 0))?;

        let s = Socket(fd, PhantomData);
        s.setsockopt(
            SOL_NETLINK,
            libc::NETLINK_ADD_MEMBERSHIP,
            &CCP_MULTICAST_GROUP as *const c_int as *const libc::c_void,
            mem::size_of::<c_int>() as libc::socklen_t,
        )?;

        Ok(s)
    }

    fn setsockopt(
        &self,
        level: c_int,
        option: c_int,
        val: *const libc::c_void,
        sz: libc::socklen_t,
    ) -> Result<()> {
        let res = unsafe { libc::setsockopt(self.0, level, option, val, sz) };
        if res == -1 {
            return Err(Error::from(Errno::last()));
        }

        Ok(())
    }

    fn __recv(&self, buf: &mut [u8], flags: MsgFlags) -> Result<usize> {
        let mut nl_buf = [0u8; MAX_MSG_LEN + NLMSG_HDRSIZE];
        let end = match socket::recv(self.0, &mut nl_buf[..], flags) {
            Ok(n) => n,
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => return Ok(0),
            Err(e) => return Err(Error::from(e)),
        };

        if end <= NLMSG_HDRSIZE {
            return Ok(0);
        }

        // truncate like the kernel would; the backend skips the cut-off frame
        let payload = &nl_buf[NLMSG_HDRSIZE..end];
        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        Ok(n)
    }

    // netlink header format (RFC 3549)
    // 0               1               2               3
    // 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
    // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    // |                          Length                             |
    // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    // |            Type              |           Flags              |
    // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    // |                      Sequence Number                        |
    // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    // |                      Process ID (PID)                       |
    // +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
    fn __send(&self, buf: &[u8]) -> Result<()> {
        let len = NLMSG_HDRSIZE + buf.len();
        let mut msg = vec![0u8; NLMSG_HDRSIZE];
        // rest of the header is 0s
        u32_to_u8s(&mut msg[0..4], len as u32);
        msg.extend_from_slice(buf);

        socket::send(self.0, &msg[..], MsgFlags::MSG_DONTWAIT)
            .map(|_| ())
            .map_err(Error::from)
    }

    fn __close(&mut self) -> Result<()> {
        nix::unistd::close(self.0).map_err(Error::from)
    }
}

impl super::Ipc for Socket<Blocking> {
    fn name() -> String {
        String::from("netlink")
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.__recv(buf, MsgFlags::empty())
    }

    fn send(&self, buf: &[u8]) -> Result<()> {
        self.__send(buf)
    }

    fn close(&mut self) -> Result<()> {
        self.__close()
    }
}

impl super::Ipc for Socket<Nonblocking> {
    fn name() -> String {
        String::from("netlink")
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.__recv(buf, MsgFlags::MSG_DONTWAIT)
    }

    fn send(&self, buf: &[u8]) -> Result<()> {
        self.__send(buf)
    }

    fn close(&mut self) -> Result<()> {
        self.__close()
    }
}

impl Socket<Blocking> {
    pub fn new() -> Result<Self> {
        let s = Self::__new()?;
        // wake up once a second to check the stop flag
        let to = libc::timeval {
            tv_sec: 1 as libc::time_t,
            tv_usec: 0 as libc::suseconds_t,
        };

        s.setsockopt(
            libc::SOL_SOCKET,
            libc::SO_RCVTIMEO,
            &to as *const libc::timeval as *const libc::c_void,
            mem::size_of::<libc::timeval>() as libc::socklen_t,
        )?;
        Ok(s)
    }
}

impl Socket<Nonblocking> {
    pub fn new() -> Result<Self> {
        Self::__new()
    }
}
