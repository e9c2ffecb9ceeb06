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

//! TCP stream connector.
//!
//! Produces the read/write halves an [`IoTransport`](crate::transport::
//! IoTransport) is built on. Nagle is disabled: commands are small and
//! latency-sensitive. The read half is buffered so the codecs' byte-at-a-time
//! parsing does not hit the socket per byte.

use crate::transport::{BoxedReader, BoxedWriter, TransportError};
use crate::util::uri::ConnectUri;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Read-side buffer size.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Connects to `uri`'s authority within `timeout`.
pub async fn connect(
    uri: &ConnectUri,
    timeout: Duration,
) -> Result<(BoxedReader, BoxedWriter), TransportError> {
    let address = uri.authority();
    debug!(%address, "connecting");
    let connect = TcpStream::connect(&address);
    let stream = match tokio::time::timeout(timeout, connect).await {
        Err(_elapsed) => {
            return Err(TransportError::Timeout { duration: timeout });
        }
        Ok(Err(source)) => {
            return Err(TransportError::ConnectionFailed { address, source });
        }
        Ok(Ok(stream)) => stream,
    };
    stream
        .set_nodelay(true)
        .map_err(|source| TransportError::ConnectionFailed {
            address: address.clone(),
            source,
        })?;
    info!(%address, "connected");
    let (reader, writer) = stream.into_split();
    Ok((
        Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, reader)),
        Box::new(writer),
    ))
}
