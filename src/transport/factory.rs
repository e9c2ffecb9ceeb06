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

//! Transport assembly from connect URIs.
//!
//! `tcp://host:port` yields one chain —
//! IoTransport → WireFormatNegotiator → ResponseCorrelator — and
//! `failover:(...)` yields a [`FailoverTransport`](crate::transport::
//! failover::FailoverTransport) that builds such chains from its pool on
//! demand. The codec is selected by the `wireFormat` option (`openwire` by
//! default, or `stomp`); `wireFormat.*` options tune the binary protocol's
//! advertised preferences.

use crate::error::MqwireError;
use crate::transport::failover::FailoverTransport;
use crate::transport::{
    tcp, IoTransport, ResponseCorrelator, Transport, TransportError, WireFormatNegotiator,
};
use crate::util::uri::{ConnectUri, UriError};
use crate::wireformat::openwire::OpenWireFormat;
use crate::wireformat::stomp::StompWireFormat;
use crate::wireformat::{WireFormat, WireFormatInfo};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Time budget for one socket connect unless overridden per URI.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds transport chains from connect URIs.
pub struct TransportFactory;

impl TransportFactory {
    /// Creates the transport named by `uri`.
    ///
    /// The returned transport is not started; call
    /// [`start`](crate::transport::Transport::start) before sending.
    pub async fn create(uri: &ConnectUri) -> Result<Arc<dyn Transport>, MqwireError> {
        match uri.scheme() {
            "failover" => Ok(Arc::new(FailoverTransport::new(uri)?)),
            "tcp" => {
                let timeout = connect_timeout(uri)?;
                let transport = Self::create_member(uri, timeout).await?;
                Ok(transport)
            }
            other => Err(UriError::UnknownScheme {
                scheme: other.to_string(),
            }
            .into()),
        }
    }

    /// Connects one pool member: a full chain over a fresh socket.
    pub(crate) async fn create_member(
        uri: &ConnectUri,
        timeout: Duration,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let wire_format = wire_format_for(uri).map_err(|error| invalid_uri(uri, error))?;
        let (reader, writer) = tcp::connect(uri, timeout).await?;
        let io = Arc::new(IoTransport::new(reader, writer, wire_format.clone()));
        let negotiator = Arc::new(WireFormatNegotiator::new(io, wire_format));
        let correlator = Arc::new(ResponseCorrelator::new(negotiator));
        Ok(correlator)
    }
}

/// Picks and configures the codec for one URI.
pub(crate) fn wire_format_for(uri: &ConnectUri) -> Result<Arc<dyn WireFormat>, UriError> {
    match uri.option("wireFormat") {
        Some("stomp") => Ok(Arc::new(StompWireFormat::new())),
        None | Some("openwire") => {
            Ok(Arc::new(OpenWireFormat::new(openwire_preferences(uri)?)))
        }
        Some(other) => Err(UriError::InvalidOptionValue {
            name: "wireFormat".to_string(),
            value: other.to_string(),
        }),
    }
}

/// Reads `wireFormat.*` preference options.
fn openwire_preferences(uri: &ConnectUri) -> Result<WireFormatInfo, UriError> {
    let mut info = WireFormatInfo::default();
    for (name, value) in uri.options() {
        let Some(key) = name.strip_prefix("wireFormat.") else {
            continue;
        };
        match key {
            "version" => info.version = parse_option(name, value)?,
            "tightEncodingEnabled" => info.tight_encoding_enabled = parse_option(name, value)?,
            "sizePrefixDisabled" => info.size_prefix_disabled = parse_option(name, value)?,
            "cacheEnabled" => info.cache_enabled = parse_option(name, value)?,
            "cacheSize" => info.cache_size = parse_option(name, value)?,
            "maxInactivityDuration" => {
                info.max_inactivity_duration = parse_option(name, value)?
            }
            "stackTraceEnabled" => info.stack_trace_enabled = parse_option(name, value)?,
            other => warn!(option = other, "ignoring unknown wireFormat option"),
        }
    }
    Ok(info)
}

pub(crate) fn connect_timeout(uri: &ConnectUri) -> Result<Duration, UriError> {
    match uri.option("connectionTimeout") {
        Some(raw) => {
            let millis: u64 = parse_option("connectionTimeout", raw)?;
            Ok(Duration::from_millis(millis))
        }
        None => Ok(DEFAULT_CONNECT_TIMEOUT),
    }
}

pub(crate) fn parse_option<T: std::str::FromStr>(
    name: &str,
    value: &str,
) -> Result<T, UriError> {
    value.parse().map_err(|_| UriError::InvalidOptionValue {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn invalid_uri(uri: &ConnectUri, error: UriError) -> TransportError {
    TransportError::ConnectionFailed {
        address: uri.authority(),
        source: io::Error::new(io::ErrorKind::InvalidInput, error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_codec_is_openwire() {
        let uri: ConnectUri = "tcp://broker:61616".parse().unwrap();
        assert_eq!(wire_format_for(&uri).unwrap().name(), "openwire");
    }

    #[test]
    fn test_stomp_codec_selected_by_option() {
        let uri: ConnectUri = "tcp://broker:61616?wireFormat=stomp".parse().unwrap();
        assert_eq!(wire_format_for(&uri).unwrap().name(), "stomp");
    }

    #[test]
    fn test_unknown_codec_rejected() {
        let uri: ConnectUri = "tcp://broker:61616?wireFormat=amqp".parse().unwrap();
        assert!(matches!(
            wire_format_for(&uri),
            Err(UriError::InvalidOptionValue { .. })
        ));
    }

    #[test]
    fn test_openwire_preferences_from_options() {
        let uri: ConnectUri =
            "tcp://b:1?wireFormat.tightEncodingEnabled=false&wireFormat.cacheSize=64"
                .parse()
                .unwrap();
        let info = openwire_preferences(&uri).unwrap();
        assert!(!info.tight_encoding_enabled);
        assert_eq!(info.cache_size, 64);
    }

    #[test]
    fn test_bad_option_value_rejected() {
        let uri: ConnectUri = "tcp://b:1?wireFormat.cacheSize=many".parse().unwrap();
        assert!(openwire_preferences(&uri).is_err());
    }
}
