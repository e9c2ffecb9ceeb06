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

//! In-memory stream pairs for tests.
//!
//! Every transport layer is testable without sockets: [`memory_pair`]
//! yields two connected (reader, writer) pairs, one per peer, with the
//! buffering and EOF behavior of a real stream. Dropping one peer's halves
//! surfaces as end-of-stream on the other, which is how tests simulate a
//! broker going away.

use crate::transport::{BoxedReader, BoxedWriter};

/// Buffer size for in-memory pairs; writes beyond this exert backpressure.
pub const MEMORY_BUFFER_SIZE: usize = 64 * 1024;

/// Creates two connected stream-half pairs, one for each peer.
///
/// # Examples
///
/// ```rust
/// use mqwire::transport::memory::memory_pair;
/// use tokio::io::{AsyncReadExt, AsyncWriteExt};
///
/// # async fn example() -> std::io::Result<()> {
/// let ((mut reader, _writer), (_peer_reader, mut peer_writer)) = memory_pair();
/// peer_writer.write_all(b"ping").await?;
///
/// let mut buffer = [0u8; 4];
/// reader.read_exact(&mut buffer).await?;
/// assert_eq!(&buffer, b"ping");
/// # Ok(())
/// # }
/// ```
pub fn memory_pair() -> ((BoxedReader, BoxedWriter), (BoxedReader, BoxedWriter)) {
    let (near, far) = tokio::io::duplex(MEMORY_BUFFER_SIZE);
    let (near_reader, near_writer) = tokio::io::split(near);
    let (far_reader, far_writer) = tokio::io::split(far);
    (
        (Box::new(near_reader), Box::new(near_writer)),
        (Box::new(far_reader), Box::new(far_writer)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_pair_is_bidirectional() {
        let ((mut reader, mut writer), (mut peer_reader, mut peer_writer)) = memory_pair();

        writer.write_all(b"to-peer").await.unwrap();
        let mut buffer = [0u8; 7];
        peer_reader.read_exact(&mut buffer).await.unwrap();
        assert_eq!(&buffer, b"to-peer");

        peer_writer.write_all(b"to-near").await.unwrap();
        reader.read_exact(&mut buffer).await.unwrap();
        assert_eq!(&buffer, b"to-near");
    }

    #[tokio::test]
    async fn test_dropping_peer_is_eof() {
        let ((mut reader, _writer), peer) = memory_pair();
        drop(peer);
        let mut buffer = [0u8; 1];
        let n = reader.read(&mut buffer).await.unwrap();
        assert_eq!(n, 0);
    }
}
