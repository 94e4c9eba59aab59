// Copyright 2019 Karl Sundequist Blomdahl <karl.sundequist.blomdahl@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fatal-path diagnostics. Programmer-contract violations use `assert!` /
//! `debug_assert!` / `unreachable!` directly -- they are checks, not runtime
//! errors. This module is for the other fatal category: an external signal
//! (abort file present, model missing) that is not a bug but still cannot be
//! recovered from.

/// Prints a diagnostic to stderr and exits the process with the given code.
/// Never returns.
pub fn fatal(site: &str, message: &str, exit_code: i32) -> ! {
    eprintln!("fatal: {}: {}", site, message);
    std::process::exit(exit_code);
}

/// Convenience wrapper around [`fatal`] that always exits with code `1`.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::log::fatal(concat!(file!(), ":", line!()), &format!($($arg)*), 1)
    };
}
