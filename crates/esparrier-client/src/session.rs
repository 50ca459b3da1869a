//! Session engine.
//!
//! A [`Session`] owns one transport and runs protocol operations on it one at
//! a time. The wire protocol has no request identifiers, so every operation
//! holds the transport lock from its first frame to its last.
//!
//! Dropping an operation future after its command was sent leaves the device
//! mid-sequence; callers should let operations run to completion and use
//! [`CloseHandle`] to abort on disconnect. A receive timeout abandons the
//! sequence too, so it closes the session: a late frame would otherwise be
//! read as the answer to the next command.

use std::sync::Arc;
use std::time::{Duration, Instant};

use esparrier_metrics::metric_defs;
use esparrier_metrics::OperationLabels;
use esparrier_protocol::{
    Command, DeviceStatus, FirmwareImage, ProtocolError, Response, MAX_FRAME_SIZE,
};
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::error::{ClientError, ClientResult, ValidationError};
use crate::transfer::{unexpected, ConfigDocument, ReadTransfer, WriteTransfer};
use crate::transport::{Transport, TransportError};

/// Engine options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Limit for each individual receive. `None` waits indefinitely.
    pub receive_timeout: Option<Duration>,
}

impl SessionOptions {
    /// Options with a receive timeout.
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }
}

/// Signals that the channel behind a session is gone.
///
/// Any operation waiting on the transport resolves to
/// `Connectivity(Closed)` once [`close`](Self::close) is called, and every
/// later operation fails the same way.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    closed: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    /// Mark the channel as closed.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Whether the channel has been marked closed.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Firmware update progress as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaProgress {
    /// Bytes written so far.
    pub received: u32,
    /// Image size.
    pub total: u32,
}

impl OtaProgress {
    /// Completion in percent, 0 to 100.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.received as f64 / self.total as f64 * 100.0).min(100.0)
    }
}

/// A control session with one device.
#[derive(Debug)]
pub struct Session<T> {
    transport: Mutex<T>,
    closed: Arc<watch::Sender<bool>>,
    options: SessionOptions,
    device: String,
}

impl<T: Transport> Session<T> {
    /// Create a session with default options.
    pub fn new(transport: T) -> Self {
        Self::with_options(transport, SessionOptions::default())
    }

    /// Create a session.
    pub fn with_options(transport: T, options: SessionOptions) -> Self {
        let device = transport.describe();
        let (closed, _) = watch::channel(false);
        Session {
            transport: Mutex::new(transport),
            closed: Arc::new(closed),
            options,
            device,
        }
    }

    /// Transport identifier.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Handle for reporting a disconnect.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            closed: self.closed.clone(),
        }
    }

    /// Whether the channel has been marked closed.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    async fn begin(&self, op: &'static str) -> Operation<'_, T> {
        let transport = self.transport.lock().await;
        debug!(device = %self.device, op, "operation started");
        Operation {
            transport,
            close: self.close_handle(),
            closed: self.closed.subscribe(),
            timeout: self.options.receive_timeout,
            labels: OperationLabels::new(self.device.clone(), op),
            started: Instant::now(),
        }
    }

    /// Read the device's running state.
    pub async fn get_status(&self) -> ClientResult<DeviceStatus> {
        let mut op = self.begin("get_state").await;
        let result = match op.exchange(&Command::GetState).await {
            Ok(Response::State(status)) => Ok(status),
            Ok(other) => Err(unexpected("state", &other)),
            Err(e) => Err(e),
        };
        op.finish(result)
    }

    /// Read the stored config as raw payload bytes.
    pub async fn read_config_raw(&self) -> ClientResult<Vec<u8>> {
        let mut op = self.begin("read_config").await;
        let result = run_read_config(&mut op).await;
        op.finish(result)
    }

    /// Read the stored config document.
    pub async fn read_config(&self) -> ClientResult<ConfigDocument> {
        let payload = self.read_config_raw().await?;
        ConfigDocument::from_payload(&payload)
    }

    /// Stage raw payload bytes as the new config.
    ///
    /// Oversized or unrepresentable payloads are rejected before anything is
    /// sent.
    pub async fn write_config_raw(&self, payload: &[u8]) -> ClientResult<()> {
        let mut op = self.begin("write_config").await;
        let result = run_write_config(&mut op, payload).await;
        op.finish(result)
    }

    /// Stage a config document. Takes effect after [`commit_config`](Self::commit_config).
    pub async fn write_config(&self, document: &ConfigDocument) -> ClientResult<()> {
        let payload = document.to_payload()?;
        self.write_config_raw(&payload).await
    }

    /// Persist the staged config. The device restarts afterwards.
    pub async fn commit_config(&self) -> ClientResult<()> {
        self.simple(Command::CommitConfig).await
    }

    /// Toggle keep-awake.
    pub async fn set_keep_awake(&self, enabled: bool) -> ClientResult<()> {
        self.simple(Command::SetKeepAwake { enabled }).await
    }

    /// Restart the device.
    pub async fn reboot(&self) -> ClientResult<()> {
        self.simple(Command::Reboot).await
    }

    /// Firmware update progress, or `None` when no update is running.
    pub async fn ota_status(&self) -> ClientResult<Option<OtaProgress>> {
        let mut op = self.begin("ota_status").await;
        let result = match op.exchange(&Command::OtaStatus).await {
            Ok(Response::Progress { received, total }) => Ok(Some(OtaProgress { received, total })),
            Ok(Response::Ok) => Ok(None),
            Ok(Response::Error(code)) => Err(ClientError::Device(code)),
            Ok(other) => Err(unexpected("progress", &other)),
            Err(e) => Err(e),
        };
        op.finish(result)
    }

    /// Abandon a running firmware update.
    pub async fn ota_abort(&self) -> ClientResult<()> {
        self.simple(Command::OtaAbort).await
    }

    /// Send a firmware image.
    ///
    /// `progress` is called after every chunk the device acknowledges. On
    /// failure after the update started, an abort is sent on a best-effort
    /// basis and the original error is returned. The device restarts once it
    /// reports completion.
    pub async fn flash_firmware<F>(&self, image: &[u8], progress: F) -> ClientResult<()>
    where
        F: FnMut(OtaProgress),
    {
        let image = FirmwareImage::new(image)
            .map_err(|e| ClientError::Validation(ValidationError::InvalidArgument(e)))?;
        let mut op = self.begin("flash_firmware").await;
        let result = run_flash(&mut op, &image, progress).await;
        op.finish(result)
    }

    async fn simple(&self, command: Command) -> ClientResult<()> {
        let mut op = self.begin(command.name()).await;
        let result = match op.exchange(&command).await {
            Ok(response) => expect_ok(response),
            Err(e) => Err(e),
        };
        op.finish(result)
    }
}

fn expect_ok(response: Response) -> ClientResult<()> {
    match response {
        Response::Ok => Ok(()),
        Response::Error(code) => Err(ClientError::Device(code)),
        other => Err(unexpected("ok", &other)),
    }
}

// ============================================================================
// Operation
// ============================================================================

/// One operation holding the transport lock.
struct Operation<'a, T> {
    transport: MutexGuard<'a, T>,
    close: CloseHandle,
    closed: watch::Receiver<bool>,
    timeout: Option<Duration>,
    labels: OperationLabels,
    started: Instant,
}

impl<T: Transport> Operation<'_, T> {
    async fn send(&mut self, frame: &[u8]) -> ClientResult<()> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed.into());
        }
        trace!(device = %self.labels.device, frame = %hex::encode(frame), "tx");

        let Operation {
            transport, closed, ..
        } = self;
        tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => {
                return Err(TransportError::Closed.into());
            }
            sent = transport.send(frame) => sent?,
        }

        let labels = [("device", self.labels.device.clone())];
        metrics::counter!(metric_defs::FRAMES_SENT.name, &labels).increment(1);
        metrics::counter!(metric_defs::BYTES_SENT.name, &labels).increment(frame.len() as u64);
        Ok(())
    }

    async fn send_command(&mut self, command: &Command) -> ClientResult<()> {
        debug!(device = %self.labels.device, command = command.name(), "sending command");
        self.send(&command.encode()).await
    }

    async fn receive(&mut self) -> ClientResult<Vec<u8>> {
        if *self.closed.borrow() {
            return Err(TransportError::Closed.into());
        }

        let Operation {
            transport,
            closed,
            timeout,
            ..
        } = self;
        let frame = tokio::select! {
            biased;
            _ = closed.wait_for(|closed| *closed) => {
                return Err(TransportError::Closed.into());
            }
            received = receive_frame(&mut **transport, *timeout) => match received {
                Ok(frame) => frame,
                Err(TransportError::TimedOut) => {
                    warn!(device = %self.labels.device, op = self.labels.op, "receive timed out, closing session");
                    self.close.close();
                    return Err(TransportError::TimedOut.into());
                }
                Err(e) => return Err(e.into()),
            },
        };

        trace!(device = %self.labels.device, frame = %hex::encode(&frame), "rx");
        let labels = [("device", self.labels.device.clone())];
        metrics::counter!(metric_defs::FRAMES_RECEIVED.name, &labels).increment(1);
        metrics::counter!(metric_defs::BYTES_RECEIVED.name, &labels).increment(frame.len() as u64);
        Ok(frame)
    }

    async fn receive_response(&mut self) -> ClientResult<Response> {
        let frame = self.receive().await?;
        let response = Response::decode(&frame)?;
        if let Response::Error(code) = &response {
            warn!(device = %self.labels.device, op = self.labels.op, %code, "device reported an error");
        }
        Ok(response)
    }

    async fn exchange(&mut self, command: &Command) -> ClientResult<Response> {
        self.send_command(command).await?;
        self.receive_response().await
    }

    fn count_blocks(&self, direction: &'static str, blocks: usize) {
        let labels = [
            ("device", self.labels.device.clone()),
            ("direction", direction.to_string()),
        ];
        metrics::counter!(metric_defs::BLOCKS_TRANSFERRED.name, &labels).increment(blocks as u64);
    }

    fn finish<R>(self, result: ClientResult<R>) -> ClientResult<R> {
        let elapsed = self.started.elapsed();
        let labels = self.labels.to_labels();
        metrics::counter!(metric_defs::OPERATIONS.name, labels.as_slice()).increment(1);
        metrics::histogram!(metric_defs::OPERATION_DURATION.name, labels.as_slice())
            .record(elapsed.as_secs_f64() * 1000.0);

        match &result {
            Ok(_) => debug!(
                device = %self.labels.device,
                op = self.labels.op,
                elapsed_ms = elapsed.as_millis() as u64,
                "operation completed"
            ),
            Err(e) => {
                let labels = self
                    .labels
                    .with(&[("kind", e.kind().as_str().to_string())]);
                metrics::counter!(metric_defs::OPERATION_ERRORS.name, labels.as_slice())
                    .increment(1);
                debug!(
                    device = %self.labels.device,
                    op = self.labels.op,
                    kind = e.kind().as_str(),
                    error = %e,
                    "operation failed"
                );
            }
        }
        result
    }
}

async fn receive_frame<T: Transport>(
    transport: &mut T,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, TransportError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, transport.receive(MAX_FRAME_SIZE))
            .await
            .map_err(|_| TransportError::TimedOut)?,
        None => transport.receive(MAX_FRAME_SIZE).await,
    }
}

// ============================================================================
// Multi-frame sequences
// ============================================================================

async fn run_read_config<T: Transport>(op: &mut Operation<'_, T>) -> ClientResult<Vec<u8>> {
    let mut transfer = ReadTransfer::new();
    op.send_command(&transfer.start()?).await?;

    let header = op.receive().await?;
    let count = transfer.on_header(&header)?;
    debug!(device = %op.labels.device, blocks = count.get(), "receiving config");

    for _ in 0..count.get() {
        let block = match op.receive().await {
            Ok(block) => block,
            Err(e) => {
                transfer.fail();
                return Err(e);
            }
        };
        transfer.on_block(&block)?;
    }
    op.count_blocks("read", count.get());

    transfer.finish()
}

async fn run_write_config<T: Transport>(
    op: &mut Operation<'_, T>,
    payload: &[u8],
) -> ClientResult<()> {
    let mut transfer = WriteTransfer::new(payload)?;
    let count = transfer.block_count();
    debug!(
        device = %op.labels.device,
        bytes = payload.len(),
        blocks = count.get(),
        "sending config"
    );

    op.send_command(&transfer.start()?).await?;
    while let Some(block) = transfer.next_block() {
        if let Err(e) = op.send(&block).await {
            transfer.fail();
            return Err(e);
        }
    }
    op.count_blocks("write", count.get());

    let ack = op.receive().await?;
    transfer.finish(&ack)
}

async fn run_flash<T: Transport, F: FnMut(OtaProgress)>(
    op: &mut Operation<'_, T>,
    image: &FirmwareImage<'_>,
    mut progress: F,
) -> ClientResult<()> {
    debug!(
        device = %op.labels.device,
        size = image.len(),
        crc = %format!("{:08x}", image.crc()),
        "starting firmware update"
    );
    op.exchange(&image.start_command())
        .await
        .and_then(expect_ok)?;

    let result = send_image(op, image, &mut progress).await;
    if let Err(e) = &result {
        if !matches!(e, ClientError::Connectivity(_)) {
            warn!(device = %op.labels.device, error = %e, "firmware update failed, aborting");
            if let Err(abort_err) = op.exchange(&Command::OtaAbort).await {
                debug!(device = %op.labels.device, error = %abort_err, "abort was not acknowledged");
            }
        }
    }
    result
}

async fn send_image<T: Transport, F: FnMut(OtaProgress)>(
    op: &mut Operation<'_, T>,
    image: &FirmwareImage<'_>,
    progress: &mut F,
) -> ClientResult<()> {
    let device_labels = [("device", op.labels.device.clone())];

    for chunk in image.chunks() {
        op.send_command(&chunk.header()?).await?;
        let packets = chunk.packets()?;
        for packet in &packets {
            op.send(packet).await?;
        }
        op.count_blocks("ota", packets.len());

        match op.receive_response().await? {
            Response::Progress { received, total } => {
                let update = OtaProgress { received, total };
                metrics::gauge!(metric_defs::OTA_PROGRESS.name, &device_labels)
                    .set(update.percent());
                progress(update);
            }
            Response::Complete => {
                metrics::gauge!(metric_defs::OTA_PROGRESS.name, &device_labels).set(100.0);
                let total = image.len() as u32;
                progress(OtaProgress {
                    received: total,
                    total,
                });
                debug!(device = %op.labels.device, "firmware update complete");
                return Ok(());
            }
            Response::Ok => {}
            Response::Error(code) => return Err(ClientError::Device(code)),
            other => return Err(unexpected("progress", &other)),
        }
    }

    Err(ClientError::Protocol(ProtocolError::InvalidData(
        "image sent but the device did not report completion".to_string(),
    )))
}
