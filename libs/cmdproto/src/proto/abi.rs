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

/// Command Request from nitroctl
#[rustfmt::skip]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandRequest {
    #[prost(enumeration="command_request::Action", tag="1")]
    pub action: i32,
    /// service names, already canonical when they came from a path
    #[prost(string, repeated, tag="2")]
    pub names: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
    /// signal number, only used by SIGNAL
    #[prost(int32, tag="3")]
    pub signal: i32,
}
/// Nested message and enum types in `CommandRequest`.
pub mod command_request {
    #[rustfmt::skip]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Action {
        List = 0,
        Up = 1,
        Down = 2,
        Start = 3,
        Stop = 4,
        Restart = 5,
        FastRestart = 6,
        Hup = 7,
        Signal = 8,
        Check = 9,
        Pidof = 10,
        WaitUp = 11,
        WaitDown = 12,
        Ready = 13,
        Rescan = 14,
        Info = 15,
        Shutdown = 16,
        Reboot = 17,
    }
}
/// Command Response from nitro
#[rustfmt::skip]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommandResponse {
    /// 0 for success, 111 for an unknown service, 1 for other failures
    #[prost(uint32, tag="1")]
    pub error_code: u32,
    #[prost(string, tag="2")]
    pub message: ::prost::alloc::string::String,
}
