//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Semantic errors raised by the command model.
//!
//! These errors are surfaced synchronously to the caller and are never fatal
//! for a transport: a rejected property name or a malformed destination
//! leaves the connection untouched.

use thiserror::Error;

/// Errors raised when constructing or mutating commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A user property used a name from the reserved header set.
    ///
    /// Reserved names carry typed message fields on the wire and are not
    /// available as user properties. The message is left unchanged.
    #[error("property name '{name}' is reserved")]
    ReservedProperty {
        /// The rejected property name.
        name: String,
    },

    /// A destination string did not match any of the known kind prefixes.
    #[error("invalid destination '{value}': {reason}")]
    InvalidDestination {
        /// The string that failed to parse.
        value: String,
        /// What was wrong with it.
        reason: &'static str,
    },
}
