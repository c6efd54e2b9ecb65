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

//! Service supervision: the registry, its state machine and the processes
//! it drives.
mod entry;
mod logpipe;
mod machine;
mod manager;
mod name;
mod notify;
mod readiness;
mod scan;
mod sigchld;
mod spawn;
mod timer;
mod waiter;

pub(crate) use machine::{Phase, Reason};
pub(crate) use manager::ServiceManager;

/// Serializes tests that fork, the reaper would collect other tests' children.
#[cfg(test)]
pub(crate) static CHILDREN_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
