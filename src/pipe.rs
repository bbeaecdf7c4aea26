//! Blocking reader over the fixed receive buffer.
//!
//! The session's reader task feeds inbound DATA into the pipe without ever
//! waiting; stream readers park here until bytes or a close arrive. A close
//! carries an optional reason: `None` is an orderly remote FIN and surfaces
//! as a clean end of stream once the buffer drains, while `Some(reason)`
//! (reset, teardown, flow-control kill) is returned to the reader instead.

use std::sync::Mutex;

use tokio::sync::Notify;

use crate::{
    buffer::{Drained, RingBuffer},
    error::Error,
};

struct State {
    buf: RingBuffer,
    reason: Option<Error>,
}

pub(crate) struct Pipe {
    state: Mutex<State>,
    notify: Notify,
}

impl Pipe {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                buf: RingBuffer::with_capacity(capacity),
                reason: None,
            }),
            notify: Notify::new(),
        }
    }

    /// Copy `p` into the buffer and wake readers. Never waits.
    pub fn write(&self, p: &[u8]) -> Result<usize, Error> {
        let result = self.state.lock().unwrap().buf.write(p);
        self.notify.notify_waiters();
        result
    }

    /// Read buffered bytes, waiting while the pipe is empty and open.
    ///
    /// After the buffer drains, a close reason is returned as the error;
    /// an orderly close reads as `Ok(0)`.
    pub async fn read(&self, p: &mut [u8]) -> Result<usize, Error> {
        if p.is_empty() {
            return Ok(0);
        }
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().unwrap();
                let (n, drained) = state.buf.read(p);
                if n > 0 {
                    return Ok(n);
                }
                match drained {
                    Drained::Eof => {
                        return match &state.reason {
                            Some(reason) => Err(reason.clone()),
                            None => Ok(0),
                        };
                    }
                    Drained::Empty | Drained::Open => {}
                }
            }
            notified.await;
        }
    }

    /// Close the pipe. Sticky; the first close wins.
    pub fn close(&self, reason: Option<Error>) {
        {
            let mut state = self.state.lock().unwrap();
            if state.buf.is_closed() {
                return;
            }
            state.buf.close();
            state.reason = reason;
        }
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::time::timeout;

    use super::*;
    use crate::frame::RstStatus;

    #[tokio::test]
    async fn reads_buffered_bytes_then_eof() {
        let pipe = Pipe::new(16);
        pipe.write(b"abc").unwrap();
        pipe.close(None);
        let mut out = [0u8; 8];
        assert_eq!(pipe.read(&mut out).await.unwrap(), 3);
        assert_eq!(&out[..3], b"abc");
        assert_eq!(pipe.read(&mut out).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn close_reason_surfaces_after_drain() {
        let pipe = Pipe::new(16);
        pipe.write(b"x").unwrap();
        pipe.close(Some(Error::Reset(RstStatus::Cancel)));
        let mut out = [0u8; 8];
        assert_eq!(pipe.read(&mut out).await.unwrap(), 1);
        assert!(matches!(
            pipe.read(&mut out).await,
            Err(Error::Reset(RstStatus::Cancel))
        ));
    }

    #[tokio::test]
    async fn first_close_wins() {
        let pipe = Pipe::new(4);
        pipe.close(Some(Error::Reset(RstStatus::Cancel)));
        pipe.close(Some(Error::Closed));
        let mut out = [0u8; 1];
        assert!(matches!(
            pipe.read(&mut out).await,
            Err(Error::Reset(RstStatus::Cancel))
        ));
    }

    #[tokio::test]
    async fn read_waits_for_write() {
        let pipe = Arc::new(Pipe::new(4));
        let reader = {
            let pipe = Arc::clone(&pipe);
            tokio::spawn(async move {
                let mut out = [0u8; 4];
                let n = pipe.read(&mut out).await.unwrap();
                out[..n].to_vec()
            })
        };
        tokio::task::yield_now().await;
        pipe.write(b"hi").unwrap();
        let got = timeout(Duration::from_secs(1), reader).await.unwrap().unwrap();
        assert_eq!(got, b"hi");
    }

    #[tokio::test]
    async fn close_wakes_parked_reader() {
        let pipe = Arc::new(Pipe::new(4));
        let reader = {
            let pipe = Arc::clone(&pipe);
            tokio::spawn(async move {
                let mut out = [0u8; 4];
                pipe.read(&mut out).await
            })
        };
        tokio::task::yield_now().await;
        pipe.close(Some(Error::Closed));
        let result = timeout(Duration::from_secs(1), reader).await.unwrap().unwrap();
        assert!(matches!(result, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn write_after_close_fails() {
        let pipe = Pipe::new(4);
        pipe.close(None);
        assert!(matches!(pipe.write(b"a"), Err(Error::Closed)));
    }
}
