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

//! State change broadcast to the listener sockets in the notify directory.
//!
//! Each event is one datagram: `[u16 LE name length][state byte][name]`.
use super::entry::ServiceState;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};

pub(crate) fn encode(name: &str, state: ServiceState) -> Vec<u8> {
    let mut frame = Vec::with_capacity(3 + name.len());
    frame.extend_from_slice(&(name.len() as u16).to_le_bytes());
    frame.push(state as u8);
    frame.extend_from_slice(name.as_bytes());
    frame
}

pub(crate) struct Broadcaster {
    dir: PathBuf,
    socket: Option<UnixDatagram>,
}

impl Broadcaster {
    pub(crate) fn new(dir: &Path) -> Self {
        let socket = match UnixDatagram::unbound() {
            Ok(s) => {
                if let Err(e) = s.set_nonblocking(true) {
                    log::warn!("notify socket stays blocking: {}", e);
                }
                Some(s)
            }
            Err(e) => {
                log::error!("failed to create the notify socket: {}", e);
                None
            }
        };
        Broadcaster {
            dir: dir.to_path_buf(),
            socket,
        }
    }

    /// Best effort: a full queue drops the event, a refused socket is removed.
    pub(crate) fn send(&self, name: &str, state: ServiceState) {
        let socket = match &self.socket {
            Some(s) => s,
            None => return,
        };
        let entries = match fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(_) => return,
        };
        let frame = encode(name, state);
        for entry in entries.flatten() {
            if !entry.file_type().map_or(false, |t| t.is_socket()) {
                continue;
            }
            let path = entry.path();
            match socket.send_to(&frame, &path) {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                    log::debug!("removing stale listener {:?}", path);
                    let _ = fs::remove_file(&path);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    log::debug!("listener {:?} is full, dropping {} {}", path, state, name);
                }
                Err(e) => log::debug!("failed to notify {:?}: {}", path, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(
            encode("sv_a", ServiceState::Up),
            vec![4, 0, 4, b's', b'v', b'_', b'a']
        );
    }

    #[test]
    fn test_send_and_stale() {
        let dir = tempfile::tempdir().unwrap();
        let listener = UnixDatagram::bind(dir.path().join("ALL,1")).unwrap();
        let stale = dir.path().join("ALL,2");
        drop(UnixDatagram::bind(&stale).unwrap());
        fs::write(dir.path().join("README"), "not a socket").unwrap();

        let notifier = Broadcaster::new(dir.path());
        notifier.send("sv_a", ServiceState::Starting);

        let mut buf = [0u8; 64];
        let n = listener.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], &encode("sv_a", ServiceState::Starting)[..]);
        assert!(!stale.exists());
        assert!(dir.path().join("README").exists());
    }
}
