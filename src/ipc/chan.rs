use std::marker::PhantomData;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use tracing::warn;

use super::{Blocking, Nonblocking};
use crate::{Error, Result};

/// An in-process datapath connection. Each channel message is one datagram.
pub struct Socket<T> {
    send: Option<Sender<Vec<u8>>>,
    recv: Option<Receiver<Vec<u8>>>,
    _phantom: PhantomData<T>,
}

impl<T> Socket<T> {
    pub fn new(to_dp: Sender<Vec<u8>>, from_dp: Receiver<Vec<u8>>) -> Self {
        Socket {
            send: Some(to_dp),
            recv: Some(from_dp),
            _phantom: PhantomData::<T>,
        }
    }

    fn __name() -> String {
        String::from("channel")
    }

    fn __send(&self, msg: &[u8]) -> Result<()> {
        let s = self.send.as_ref().ok_or(Error::ChannelClosed)?;
        s.try_send(msg.to_vec()).map_err(|e| match e {
            TrySendError::Full(_) => Error::Ipc(String::from("send channel full")),
            TrySendError::Disconnected(_) => Error::ChannelClosed,
        })
    }

    fn __receiver(&self) -> Result<&Receiver<Vec<u8>>> {
        self.recv.as_ref().ok_or(Error::ChannelClosed)
    }

    fn __close(&mut self) -> Result<()> {
        self.send.take();
        self.recv.take();
        Ok(())
    }
}

// An oversized datagram is truncated like a socket would; the backend skips
// the cut-off frame as malformed.
fn copy_datagram(buf: &[u8], msg: &mut [u8]) -> Result<usize> {
    let n = buf.len().min(msg.len());
    if n < buf.len() {
        warn!(bytes = buf.len(), kept = n, "truncating oversized datagram");
    }

    msg[..n].copy_from_slice(&buf[..n]);
    Ok(n)
}

impl super::Ipc for Socket<Blocking> {
    fn name() -> String {
        Self::__name()
    }

    fn send(&self, msg: &[u8]) -> Result<()> {
        self.__send(msg)
    }

    fn recv(&self, msg: &mut [u8]) -> Result<usize> {
        match self.__receiver()?.recv_timeout(Duration::from_secs(1)) {
            Ok(buf) => copy_datagram(&buf, msg),
            Err(RecvTimeoutError::Timeout) => Ok(0),
            Err(RecvTimeoutError::Disconnected) => Err(Error::ChannelClosed),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.__close()
    }
}

impl super::Ipc for Socket<Nonblocking> {
    fn name() -> String {
        Self::__name()
    }

    fn send(&self, msg: &[u8]) -> Result<()> {
        self.__send(msg)
    }

    fn recv(&self, msg: &mut [u8]) -> Result<usize> {
        match self.__receiver()?.try_recv() {
            Ok(buf) => copy_datagram(&buf, msg),
            Err(TryRecvError::Empty) => Ok(0),
            Err(TryRecvError::Disconnected) => Err(Error::ChannelClosed),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.__close()
    }
}

#[cfg(test)]
mod tests {
    use super::Socket;
    use crate::ipc::{Blocking, Ipc, Nonblocking};
    use crate::Error;
    use std::thread;

    #[test]
    fn basic() {
        let (tx, rx) = crossbeam::channel::unbounded();

        let (s1, r1) = crossbeam::channel::unbounded();
        let (s2, r2) = crossbeam::channel::unbounded();

        let ipc = Socket::<Blocking>::new(s1, r2);

        thread::spawn(move || {
            s2.send(vec![0, 9, 1, 8]).unwrap();
            let x = r1.recv().unwrap();
            assert_eq!(x, vec![0, 9, 1, 8]);
            tx.send(()).unwrap();
        });

        let mut buf = [0u8; 8];
        let l = ipc.recv(&mut buf).unwrap();
        ipc.send(&buf[..l]).unwrap();
        rx.recv().unwrap();
    }

    #[test]
    fn nonblocking_empty_is_zero() {
        let (s1, _r1) = crossbeam::channel::unbounded();
        let (_s2, r2) = crossbeam::channel::unbounded::<Vec<u8>>();
        let ipc = Socket::<Nonblocking>::new(s1, r2);
        let mut buf = [0u8; 8];
        assert_eq!(ipc.recv(&mut buf).unwrap(), 0);
    }

    #[test]
    fn disconnected_is_closed() {
        let (s1, _r1) = crossbeam::channel::unbounded();
        let (s2, r2) = crossbeam::channel::unbounded::<Vec<u8>>();
        let ipc = Socket::<Blocking>::new(s1, r2);
        drop(s2);
        let mut buf = [0u8; 8];
        assert!(matches!(ipc.recv(&mut buf), Err(Error::ChannelClosed)));
    }

    #[test]
    fn oversized_datagram_is_truncated() {
        let (s1, _r1) = crossbeam::channel::unbounded();
        let (s2, r2) = crossbeam::channel::unbounded();
        let ipc = Socket::<Nonblocking>::new(s1, r2);
        s2.send((0..12).collect::<Vec<u8>>()).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(ipc.recv(&mut buf).unwrap(), 8);
        assert_eq!(buf, [0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn send_after_close_fails() {
        let (s1, _r1) = crossbeam::channel::unbounded();
        let (_s2, r2) = crossbeam::channel::unbounded::<Vec<u8>>();
        let mut ipc = Socket::<Blocking>::new(s1, r2);
        ipc.close().unwrap();
        assert!(matches!(ipc.send(&[1, 2, 3]), Err(Error::ChannelClosed)));
    }
}
