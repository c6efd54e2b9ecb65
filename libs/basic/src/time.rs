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


//! time units

/// USec infinity
pub const USEC_INFINITY: u64 = u64::MAX;

/// USec per Sec
pub const USEC_PER_SEC: u64 = 1000000;
/// USec per MSec
pub const USEC_PER_MSEC: u64 = 1000;
/// NSec per Sec
pub const NSEC_PER_SEC: u64 = 1000000000;
/// NSec per USec
pub const NSEC_PER_USEC: u64 = 1000;

/// microseconds left until `deadline`, zero when it already passed
pub fn usec_until(deadline: std::time::Instant) -> u64 {
    let left = deadline.saturating_duration_since(std::time::Instant::now());
    u64::try_from(left.as_micros()).unwrap_or(USEC_INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_usec_until() {
        let past = Instant::now();
        std::thread::sleep(Duration::from_millis(1));
        assert_eq!(usec_until(past), 0);

        let left = usec_until(Instant::now() + Duration::from_secs(2));
        assert!(left > USEC_PER_SEC && left <= 2 * USEC_PER_SEC);
        assert_eq!(USEC_PER_SEC / USEC_PER_MSEC, 1000);
    }
}
