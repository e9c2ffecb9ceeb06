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

//! Connect URIs.
//!
//! Two shapes are accepted: a simple transport URI
//! `scheme://host:port?opt=val&opt=val`, and a composite URI whose authority
//! is a parenthesised, comma-separated list of child URIs,
//! e.g. `failover:(tcp://a:61616,tcp://b:61616)?randomize=false`. Options
//! are opaque string pairs; each consumer picks the ones it knows and warns
//! about the rest.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default broker port when a simple URI omits one.
pub const DEFAULT_PORT: u16 = 61616;

/// Errors raised while parsing a connect URI.
#[derive(Debug, Error)]
pub enum UriError {
    /// The URI had no `scheme://` or `scheme:(` part.
    #[error("connect URI '{uri}' has no scheme")]
    MissingScheme {
        /// The offending URI.
        uri: String,
    },

    /// The authority's port was not a number in range.
    #[error("connect URI '{uri}' has an invalid port")]
    InvalidPort {
        /// The offending URI.
        uri: String,
    },

    /// A composite URI's parenthesised list never closed.
    #[error("composite URI '{uri}' has unbalanced parentheses")]
    UnbalancedParens {
        /// The offending URI.
        uri: String,
    },

    /// The authority or a composite member was empty.
    #[error("connect URI '{uri}' has an empty authority")]
    EmptyAuthority {
        /// The offending URI.
        uri: String,
    },

    /// An option was not a `key=value` pair.
    #[error("connect URI option '{option}' is not key=value")]
    MalformedOption {
        /// The offending option text.
        option: String,
    },

    /// An option carried a value outside its accepted set.
    #[error("connect URI option '{name}' has invalid value '{value}'")]
    InvalidOptionValue {
        /// The option name.
        name: String,
        /// The rejected value.
        value: String,
    },

    /// The URI scheme names no known transport.
    #[error("unknown connect URI scheme '{scheme}'")]
    UnknownScheme {
        /// The offending scheme.
        scheme: String,
    },
}

/// One parsed connect URI, simple or composite.
///
/// # Examples
///
/// ```rust
/// use mqwire::util::uri::ConnectUri;
///
/// let simple: ConnectUri = "tcp://broker:61616?wireFormat=stomp".parse().unwrap();
/// assert_eq!(simple.scheme(), "tcp");
/// assert_eq!(simple.option("wireFormat"), Some("stomp"));
///
/// let composite: ConnectUri =
///     "failover:(tcp://a:61616,tcp://b:61617)?randomize=false".parse().unwrap();
/// assert_eq!(composite.members().len(), 2);
/// assert_eq!(composite.option("randomize"), Some("false"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectUri {
    scheme: String,
    host: String,
    port: u16,
    options: Vec<(String, String)>,
    members: Vec<ConnectUri>,
}

impl ConnectUri {
    /// The URI scheme, e.g. `tcp` or `failover`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host part; empty for composite URIs.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port part; [`DEFAULT_PORT`] when omitted.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port` for socket connects.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// First value of a query option.
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// All query options in declaration order.
    pub fn options(&self) -> &[(String, String)] {
        &self.options
    }

    /// Child URIs of a composite; empty for simple URIs.
    pub fn members(&self) -> &[ConnectUri] {
        &self.members
    }

    /// True when this is a composite URI.
    pub fn is_composite(&self) -> bool {
        !self.members.is_empty()
    }
}

impl FromStr for ConnectUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((scheme, rest)) = s.split_once(":(") {
            // Composite: scheme:(child,child,...)?options
            let close = rest.rfind(')').ok_or_else(|| UriError::UnbalancedParens {
                uri: s.to_string(),
            })?;
            let list = &rest[..close];
            if list.is_empty() {
                return Err(UriError::EmptyAuthority { uri: s.to_string() });
            }
            let members = list
                .split(',')
                .map(|child| child.trim().parse())
                .collect::<Result<Vec<_>, _>>()?;
            let options = match rest[close + 1..].strip_prefix('?') {
                Some(query) => parse_options(query)?,
                None => Vec::new(),
            };
            return Ok(ConnectUri {
                scheme: scheme.to_string(),
                host: String::new(),
                port: 0,
                options,
                members,
            });
        }

        let (scheme, rest) = s.split_once("://").ok_or_else(|| UriError::MissingScheme {
            uri: s.to_string(),
        })?;
        if scheme.is_empty() {
            return Err(UriError::MissingScheme { uri: s.to_string() });
        }
        let (authority, query) = match rest.split_once('?') {
            Some((authority, query)) => (authority, Some(query)),
            None => (rest, None),
        };
        if authority.is_empty() {
            return Err(UriError::EmptyAuthority { uri: s.to_string() });
        }
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (
                host,
                port.parse().map_err(|_| UriError::InvalidPort {
                    uri: s.to_string(),
                })?,
            ),
            None => (authority, DEFAULT_PORT),
        };
        let options = match query {
            Some(query) => parse_options(query)?,
            None => Vec::new(),
        };
        Ok(ConnectUri {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
            options,
            members: Vec::new(),
        })
    }
}

impl fmt::Display for ConnectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_composite() {
            write!(f, "{}:(", self.scheme)?;
            for (i, member) in self.members.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{member}")?;
            }
            f.write_str(")")?;
        } else {
            write!(f, "{}://{}:{}", self.scheme, self.host, self.port)?;
        }
        for (i, (name, value)) in self.options.iter().enumerate() {
            f.write_str(if i == 0 { "?" } else { "&" })?;
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

fn parse_options(query: &str) -> Result<Vec<(String, String)>, UriError> {
    if query.is_empty() {
        return Ok(Vec::new());
    }
    query
        .split('&')
        .map(|pair| {
            pair.split_once('=')
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .ok_or_else(|| UriError::MalformedOption {
                    option: pair.to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_uri() {
        let uri: ConnectUri = "tcp://broker:61616".parse().unwrap();
        assert_eq!(uri.scheme(), "tcp");
        assert_eq!(uri.authority(), "broker:61616");
        assert!(!uri.is_composite());
    }

    #[test]
    fn test_default_port() {
        let uri: ConnectUri = "tcp://broker".parse().unwrap();
        assert_eq!(uri.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_options_in_order() {
        let uri: ConnectUri = "tcp://b:1?x=1&y=2".parse().unwrap();
        assert_eq!(uri.option("x"), Some("1"));
        assert_eq!(uri.option("y"), Some("2"));
        assert_eq!(uri.option("z"), None);
    }

    #[test]
    fn test_composite_uri() {
        let uri: ConnectUri = "failover:(tcp://a:61616,tcp://b:61617)?randomize=false"
            .parse()
            .unwrap();
        assert!(uri.is_composite());
        assert_eq!(uri.scheme(), "failover");
        assert_eq!(uri.members().len(), 2);
        assert_eq!(uri.members()[1].authority(), "b:61617");
        assert_eq!(uri.option("randomize"), Some("false"));
    }

    #[test]
    fn test_composite_member_options_survive() {
        let uri: ConnectUri = "failover:(tcp://a:1?wireFormat=stomp)".parse().unwrap();
        assert_eq!(uri.members()[0].option("wireFormat"), Some("stomp"));
    }

    #[test]
    fn test_display_round_trip() {
        for raw in [
            "tcp://broker:61616",
            "tcp://broker:61616?wireFormat=stomp",
            "failover:(tcp://a:61616,tcp://b:61617)?randomize=false&backup=true",
        ] {
            let uri: ConnectUri = raw.parse().unwrap();
            assert_eq!(uri.to_string(), raw);
        }
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            "broker:61616".parse::<ConnectUri>(),
            Err(UriError::MissingScheme { .. })
        ));
        assert!(matches!(
            "tcp://broker:notaport".parse::<ConnectUri>(),
            Err(UriError::InvalidPort { .. })
        ));
        assert!(matches!(
            "failover:(tcp://a:1".parse::<ConnectUri>(),
            Err(UriError::UnbalancedParens { .. })
        ));
        assert!(matches!(
            "tcp://b:1?broken".parse::<ConnectUri>(),
            Err(UriError::MalformedOption { .. })
        ));
    }
}
