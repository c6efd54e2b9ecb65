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

//! Fixtures shared by the tests of the workspace crates
use std::{
    env, fs,
    io::{self, ErrorKind},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

/// the workspace root, found by walking up from the current dir to Cargo.lock
pub fn get_project_root() -> io::Result<PathBuf> {
    let cwd = env::current_dir()?;
    cwd.ancestors()
        .find(|p| p.join("Cargo.lock").is_file())
        .map(Path::to_path_buf)
        .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "no Cargo.lock above the current dir"))
}

/// a file of the workspace by its path relative to the root
pub fn get_workspace_file(relative: &str) -> io::Result<PathBuf> {
    let path = get_project_root()?.join(relative);
    if !path.exists() {
        return Err(io::Error::new(
            ErrorKind::NotFound,
            format!("{} not found", path.display()),
        ));
    }
    Ok(path)
}

/// Write an executable `file` into `service_dir`, creating the directory.
/// Bodies without their own `#!` line run under /bin/sh.
pub fn write_script(service_dir: &Path, file: &str, body: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(service_dir)?;
    let path = service_dir.join(file);
    if body.starts_with("#!") {
        fs::write(&path, body)?;
    } else {
        fs::write(&path, format!("#!/bin/sh\n{}\n", body))?;
    }
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
    Ok(path)
}
