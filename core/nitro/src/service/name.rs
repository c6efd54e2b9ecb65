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

//! Service names: plain, template (`name@`), instance (`name@inst`) and SYS.
use crate::error::*;
use constants::SYS_SERVICE;
use std::path::{Component, Path};

/// What a name denotes
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Kind {
    Plain,
    Template,
    Instance { template: String, instance: String },
    Sys,
}

impl Kind {
    pub(crate) fn is_template(&self) -> bool {
        matches!(self, Kind::Template)
    }

    /// The instance argument given to setup and run
    pub(crate) fn instance(&self) -> Option<&str> {
        match self {
            Kind::Instance { instance, .. } => Some(instance),
            _ => None,
        }
    }
}

/// Classify a service name, rejecting anything that is not a single
/// visible directory entry.
pub(crate) fn parse(name: &str) -> Result<Kind> {
    if name.is_empty() || name.starts_with('.') || name.contains('/') || name.contains('\0') {
        return Err(Error::InvalidName {
            name: name.to_string(),
        });
    }
    if name == SYS_SERVICE {
        return Ok(Kind::Sys);
    }

    match name.split_once('@') {
        None => Ok(Kind::Plain),
        Some(("", _)) => Err(Error::InvalidName {
            name: name.to_string(),
        }),
        Some((_, "")) => Ok(Kind::Template),
        Some((prefix, instance)) => Ok(Kind::Instance {
            template: format!("{}@", prefix),
            instance: instance.to_string(),
        }),
    }
}

/// Map a control argument to a name directly below `root`. Absolute
/// arguments must already be canonical.
pub(crate) fn from_argument(arg: &str, root: &Path) -> Result<String> {
    if !arg.starts_with('/') {
        return Ok(arg.to_string());
    }

    let rel = Path::new(arg)
        .strip_prefix(root)
        .map_err(|_| Error::InvalidName {
            name: arg.to_string(),
        })?;
    let mut components = rel.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(n)), None) => n.to_str().map(str::to_string).ok_or_else(|| {
            Error::InvalidName {
                name: arg.to_string(),
            }
        }),
        _ => Err(Error::InvalidName {
            name: arg.to_string(),
        }),
    }
}
