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

//! The socket-owning transport.
//!
//! [`IoTransport`] owns one read half and one write half. `start` spawns the
//! reader task, which decodes commands and delivers them to the listener
//! until the stream fails or the transport closes. Writes happen on the
//! caller's task under a mutex on the write half, one encode+write per
//! critical section.
//!
//! Close ordering matters: the closed flag is set first, then the reader
//! task is aborted — the async analog of closing the input stream to
//! interrupt a blocked read — then awaited, and only then is the write half
//! shut down. A reader failure observed after the closed flag is set is not
//! reported; close must not manufacture errors.

use crate::command::Command;
use crate::transport::{BoxedReader, BoxedWriter, Transport, TransportError, TransportListener};
use crate::wireformat::{CodecError, WireFormat};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

struct IoShared {
    wire_format: Arc<dyn WireFormat>,
    listener: StdMutex<Option<Arc<dyn TransportListener>>>,
    closed: AtomicBool,
}

impl IoShared {
    fn listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.listener.lock().expect("listener lock").clone()
    }
}

/// Transport over one stream pair, driven by a dedicated reader task.
pub struct IoTransport {
    shared: Arc<IoShared>,
    reader: StdMutex<Option<BoxedReader>>,
    writer: Mutex<BoxedWriter>,
    reader_task: StdMutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl IoTransport {
    /// Creates a transport over the given halves and codec.
    pub fn new(
        reader: BoxedReader,
        writer: BoxedWriter,
        wire_format: Arc<dyn WireFormat>,
    ) -> Self {
        Self {
            shared: Arc::new(IoShared {
                wire_format,
                listener: StdMutex::new(None),
                closed: AtomicBool::new(false),
            }),
            reader: StdMutex::new(Some(reader)),
            writer: Mutex::new(writer),
            reader_task: StdMutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// The codec this transport encodes and decodes with.
    pub fn wire_format(&self) -> &Arc<dyn WireFormat> {
        &self.shared.wire_format
    }

    async fn read_loop(shared: Arc<IoShared>, mut reader: BoxedReader) {
        loop {
            match shared.wire_format.unmarshal(&mut *reader).await {
                Ok(command) => {
                    trace!(tag = command.type_tag(), "inbound command");
                    match shared.listener() {
                        Some(listener) => listener.on_command(command),
                        None => trace!("dropping inbound command, no listener"),
                    }
                }
                Err(error) => {
                    // Report once, and never after close: a blocked read that
                    // close interrupted is not a transport failure.
                    if !shared.closed.load(Ordering::SeqCst) {
                        let error = match error {
                            CodecError::Io { source } => TransportError::ConnectionLost {
                                reason: "read failed".to_string(),
                                source: Some(source),
                            },
                            other => TransportError::Codec { source: other },
                        };
                        debug!(%error, "reader failed");
                        if let Some(listener) = shared.listener() {
                            listener.on_exception(error);
                        }
                    }
                    return;
                }
            }
            if shared.closed.load(Ordering::SeqCst) {
                return;
            }
        }
    }
}

#[async_trait]
impl Transport for IoTransport {
    async fn start(&self) -> Result<(), TransportError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let reader = self
            .reader
            .lock()
            .expect("reader lock")
            .take()
            .ok_or(TransportError::NotStarted)?;
        let handle = tokio::spawn(Self::read_loop(self.shared.clone(), reader));
        *self.reader_task.lock().expect("reader task lock") = Some(handle);
        Ok(())
    }

    async fn oneway(&self, command: Command) -> Result<(), TransportError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if !self.started.load(Ordering::SeqCst) {
            return Err(TransportError::NotStarted);
        }
        let mut writer = self.writer.lock().await;
        self.shared
            .wire_format
            .marshal(&command, &mut **writer)
            .await
            .map_err(|error| match error {
                CodecError::Io { source } => TransportError::WriteFailed { source },
                other => TransportError::Codec { source: other },
            })
    }

    async fn request(
        &self,
        _command: Command,
        _timeout: Option<Duration>,
    ) -> Result<Command, TransportError> {
        Err(TransportError::UnsupportedOperation {
            operation: "request",
        })
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        *self.shared.listener.lock().expect("listener lock") = Some(listener);
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // Interrupt the reader before joining it, or the join could wait on
        // a read that never returns.
        let handle = self.reader_task.lock().expect("reader task lock").take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.reader.lock().expect("reader lock").take();
        *self.shared.listener.lock().expect("listener lock") = None;
        let mut writer = self.writer.lock().await;
        use tokio::io::AsyncWriteExt;
        let _ = writer.shutdown().await;
        debug!("io transport closed");
        Ok(())
    }
}
