// Copyright (c) 2022 Huawei Technologies Co.,Ltd. All rights reserved.
//
// sysMaster is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan
// PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//         http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY
// KIND, EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO
// NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Encapsulate the command request into a frame
use crate::error::*;
use nix::sys::socket::{self, UnixCredentials};
use prost::bytes::BytesMut;
use prost::Message;
use std::{
    io::{Read, Write},
    os::unix::io::RawFd,
    rc::Rc,
};

use super::execute::{ExecuterAction, Reply};
use super::{execute, CommandRequest, CommandResponse};

/// Refuse frames claiming to be larger than this
const MAX_MSG_LEN: usize = 1 << 20;
/// The length of u8 to represent usize
const USIZE_TO_U8_LENGTH: usize = 8;

/// Frame : encode/decode
pub trait FrameCoder
where
    Self: Message + Sized + Default,
{
    /// Encode message into frame
    fn encode_frame(&self, buf: &mut BytesMut) -> Result<()> {
        self.encode(buf).context(EncodeSnafu)?;
        Ok(())
    }

    /// frame decode frame into Message
    fn decode_frame(buf: &mut BytesMut) -> Result<Self> {
        let msg = Self::decode(&buf[..]).context(DecodeSnafu)?;
        Ok(msg)
    }
}

impl FrameCoder for CommandRequest {}
impl FrameCoder for CommandResponse {}

fn recv_exact(fd: RawFd, buf: &mut [u8]) -> Result<()> {
    let mut cur_len: usize = 0;
    while cur_len < buf.len() {
        match socket::recv(fd, &mut buf[cur_len..], socket::MsgFlags::empty()) {
            Ok(0) => {
                return Err(Error::ReadStream {
                    msg: "connection closed".to_string(),
                })
            }
            Ok(len) => cur_len += len,
            Err(nix::Error::EINTR) => continue,
            Err(e) => return Err(Error::ReadStream { msg: e.to_string() }),
        }
    }
    Ok(())
}

fn send_all(fd: RawFd, buf: &[u8]) -> Result<()> {
    let mut cur_len: usize = 0;
    while cur_len < buf.len() {
        match socket::send(fd, &buf[cur_len..], socket::MsgFlags::MSG_NOSIGNAL) {
            Ok(len) => cur_len += len,
            Err(nix::Error::EINTR) => continue,
            Err(e) => return Err(Error::SendStream { msg: e.to_string() }),
        }
    }
    Ok(())
}

/// Read frame from accept fd.
pub fn read_frame_from_fd(fd: RawFd, buf: &mut BytesMut) -> Result<()> {
    // 1. Got the message length
    let mut msg_len = [0_u8; USIZE_TO_U8_LENGTH];
    recv_exact(fd, &mut msg_len)?;
    let msg_len = get_msg_len(msg_len)?;

    // 2. Got the message
    let mut tmp = vec![0; msg_len];
    recv_exact(fd, &mut tmp)?;
    buf.extend_from_slice(&tmp);
    Ok(())
}

/// read frame from stream
pub fn read_frame_from_stream<S>(stream: &mut S, buf: &mut BytesMut) -> Result<()>
where
    S: Read + Unpin + Send,
{
    // 1. Got the message length
    let mut msg_len = [0_u8; USIZE_TO_U8_LENGTH];
    stream.read_exact(&mut msg_len).context(IoSnafu)?;
    let msg_len = get_msg_len(msg_len)?;

    // 2. Got the message
    let mut tmp = vec![0; msg_len];
    stream.read_exact(&mut tmp).context(IoSnafu)?;
    buf.extend_from_slice(&tmp);
    Ok(())
}

/// Write one framed response to a connection, used for replies that were deferred
pub fn send_response(fd: RawFd, msg: &CommandResponse) -> Result<()> {
    let mut buf = BytesMut::new();
    msg.encode_frame(&mut buf)?;
    let encoded = buf.freeze();
    send_all(fd, &msg_len_vec(encoded.len()))?;
    send_all(fd, &encoded)
}

/// Read one framed response, the counterpart of [`send_response`]
pub fn read_response<S>(stream: &mut S) -> Result<CommandResponse>
where
    S: Read + Unpin + Send,
{
    let mut buf = BytesMut::new();
    read_frame_from_stream(stream, &mut buf)?;
    CommandResponse::decode_frame(&mut buf)
}

fn msg_len_vec(len: usize) -> [u8; USIZE_TO_U8_LENGTH] {
    (len as u64).to_le_bytes()
}

fn get_msg_len(message: [u8; USIZE_TO_U8_LENGTH]) -> Result<usize> {
    let len = u64::from_le_bytes(message) as usize;
    if len > MAX_MSG_LEN {
        return Err(Error::ReadStream {
            msg: format!("Invalid message length {}", len),
        });
    }
    Ok(len)
}

/// Handle read and write of server-side socket
pub struct ProstServerStream<T> {
    accept_fd: RawFd,
    manager: Rc<T>,
    cred: Option<UnixCredentials>,
}

/// Handle read and write of client-side socket
pub struct ProstClientStream<S> {
    inner: S,
}

impl<T> ProstServerStream<T>
where
    T: ExecuterAction,
{
    /// new ProstServerStream
    pub fn new(accept_fd: RawFd, manager: Rc<T>, cred: Option<UnixCredentials>) -> Self {
        Self {
            accept_fd,
            manager,
            cred,
        }
    }

    /// process frame in server-side, returns true when the manager took over
    /// the connection to answer later
    pub fn process(self) -> Result<bool> {
        let cmd = self.recv()?;
        match execute::dispatch(
            cmd,
            Rc::clone(&self.manager),
            self.cred,
            self.accept_fd,
        ) {
            Reply::Done(res) => {
                send_response(self.accept_fd, &res)?;
                Ok(false)
            }
            Reply::Deferred => Ok(true),
        }
    }

    fn recv(&self) -> Result<CommandRequest> {
        let mut buf = BytesMut::new();
        read_frame_from_fd(self.accept_fd, &mut buf)?;
        CommandRequest::decode_frame(&mut buf)
    }
}

impl<S> ProstClientStream<S>
where
    S: Read + Write + Unpin + Send,
{
    /// new ProstClientStream
    pub fn new(stream: S) -> Self {
        Self { inner: stream }
    }

    /// process frame in client-side
    pub fn execute(&mut self, cmd: CommandRequest) -> Result<CommandResponse> {
        self.send(cmd)?;
        self.recv()
    }

    fn send(&mut self, msg: CommandRequest) -> Result<()> {
        let mut buf = BytesMut::new();
        msg.encode_frame(&mut buf)?;
        let encoded = buf.freeze();
        let msg_len = msg_len_vec(encoded.len());
        self.inner.write_all(&msg_len).context(IoSnafu)?;
        self.inner.write_all(&encoded).context(IoSnafu)?;
        self.inner.flush().context(IoSnafu)?;
        Ok(())
    }

    fn recv(&mut self) -> Result<CommandResponse> {
        read_response(&mut self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::super::execute::tests::TestExecAction;
    use super::super::Action;
    use super::*;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_send_and_recv() {
        let (server, client) = UnixStream::pair().unwrap();
        let handle = thread::spawn(move || {
            let mut client = ProstClientStream::new(client);
            client
                .execute(CommandRequest::new_service(
                    Action::Pidof,
                    vec!["b".to_string()],
                ))
                .unwrap()
        });

        let manager = Rc::new(TestExecAction::default());
        let stream = ProstServerStream::new(server.as_raw_fd(), manager, None);
        assert!(!stream.process().unwrap());

        let res = handle.join().unwrap();
        assert_eq!(res.error_code, 0);
        assert_eq!(res.message, "42");
    }

    #[test]
    fn test_deferred_reply() {
        let (server, client) = UnixStream::pair().unwrap();
        let handle = thread::spawn(move || {
            let mut client = ProstClientStream::new(client);
            client
                .execute(CommandRequest::new_service(
                    Action::WaitDown,
                    vec!["a".to_string()],
                ))
                .unwrap()
        });

        let manager = Rc::new(TestExecAction {
            defer: true,
            ..Default::default()
        });
        let stream = ProstServerStream::new(server.as_raw_fd(), manager, None);
        assert!(stream.process().unwrap());

        thread::sleep(Duration::from_millis(50));
        send_response(server.as_raw_fd(), &CommandResponse::ok("done")).unwrap();
        let res = handle.join().unwrap();
        assert_eq!(res.message, "done");
    }

    #[test]
    fn test_client_timeout() {
        let (_server, client) = UnixStream::pair().unwrap();
        client
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        let mut client = ProstClientStream::new(client);
        let err = client
            .execute(CommandRequest::new_global(Action::List))
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_oversized_frame() {
        let (server, mut client) = UnixStream::pair().unwrap();
        client.write_all(&u64::MAX.to_le_bytes()).unwrap();
        let mut buf = BytesMut::new();
        assert!(read_frame_from_fd(server.as_raw_fd(), &mut buf).is_err());
    }
}
