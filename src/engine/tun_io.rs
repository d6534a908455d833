use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{FromRawFd, RawFd};

use tokio::io::unix::AsyncFd;

/// Async packet I/O over a raw tunnel descriptor.
///
/// Takes ownership of the descriptor and closes it on drop. The fd is
/// registered with the reactor here, independent of whatever the
/// channel that produced it does with its own copy.
pub(crate) struct TunIo {
    fd: AsyncFd<File>,
}

impl TunIo {
    pub fn from_raw_fd(raw: RawFd) -> io::Result<Self> {
        let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if flags & libc::O_NONBLOCK == 0 {
            let rc = unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) };
            if rc < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        let file = unsafe { File::from_raw_fd(raw) };
        Ok(Self {
            fd: AsyncFd::new(file)?,
        })
    }

    pub async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.readable().await?;
            match guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.read(buf)
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    pub async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.fd.writable().await?;
            match guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.write(buf)
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe() -> (RawFd, File) {
        let mut fds = [0; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        (fds[0], unsafe { File::from_raw_fd(fds[1]) })
    }

    #[tokio::test]
    async fn test_recv_reads_written_bytes() {
        let (read_end, mut write_end) = pipe();
        let io = TunIo::from_raw_fd(read_end).unwrap();

        write_end.write_all(b"packet").unwrap();

        let mut buf = [0u8; 64];
        let n = io.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"packet");
    }

    #[tokio::test]
    async fn test_send_through_pipe() {
        let mut fds = [0; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        let mut read_end = unsafe { File::from_raw_fd(fds[0]) };
        let io = TunIo::from_raw_fd(fds[1]).unwrap();

        let n = io.send(b"reply").await.unwrap();
        assert_eq!(n, 5);

        let mut buf = [0u8; 64];
        let n = read_end.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"reply");
    }

    #[tokio::test]
    async fn test_bad_descriptor_is_rejected() {
        assert!(TunIo::from_raw_fd(-1).is_err());
    }
}
