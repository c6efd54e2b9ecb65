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

//! Control channel protocol between nitroctl and nitro
//!
//! A request names an action and the services it applies to; the daemon
//! answers with an error code and a message. Each message travels as an
//! 8-byte little-endian length followed by the protobuf encoding.
#![deny(missing_docs)]
pub mod error;
pub mod proto;

pub use error::{Error, Result, ERROR_CODE_MASK_PRINT_STDOUT};
