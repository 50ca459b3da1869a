//! Scripted in-memory device for integration tests.
//!
//! `MockDevice` plays the firmware side of the control protocol: it decodes
//! host frames, keeps config and update state, and queues response frames.
//! Clones share state, so a test can hand one clone to a session and inspect
//! the other.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use esparrier_client::{Transport, TransportError};
use esparrier_protocol::{
    crc32, payload_end, Command, DeviceErrorCode, DeviceStatus, Features, FirmwareVersion,
    Model, OtaErrorCode, Response, BLOCK_SIZE, MAX_FIRMWARE_SIZE,
};

/// Whole-sequence events as seen by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Frame received from the host.
    HostFrame(Vec<u8>),
    /// Frame delivered to the host.
    DeviceFrame(Vec<u8>),
}

#[derive(Debug)]
enum Mode {
    Commands,
    ConfigBlocks {
        remaining: usize,
        buf: Vec<u8>,
    },
    OtaPackets {
        remaining: usize,
        length: usize,
        buf: Vec<u8>,
    },
}

#[derive(Debug)]
struct OtaSession {
    size: usize,
    crc: u32,
    data: Vec<u8>,
}

#[derive(Debug)]
pub struct DeviceState {
    pub status: DeviceStatus,
    /// Stored config payload.
    pub config: Vec<u8>,
    /// Payload staged by the last successful write.
    pub staged: Option<Vec<u8>>,
    pub commits: usize,
    pub reboots: usize,
    /// Image accepted by the last completed update.
    pub firmware: Option<Vec<u8>>,
    /// Flip one byte of every received update image.
    pub corrupt_ota: bool,
    /// Never answer; receives wait forever.
    pub silent: bool,
    /// Close the channel after delivering this many frames.
    pub close_after: Option<usize>,
    /// Close the channel after accepting this many host frames.
    pub fail_send_after: Option<usize>,
    /// Frames answered instead of the computed response, one per command.
    pub scripted: VecDeque<Vec<u8>>,
    pub events: Vec<Event>,
    delivered: usize,
    accepted: usize,
    outbox: VecDeque<Vec<u8>>,
    mode: Mode,
    ota: Option<OtaSession>,
}

impl DeviceState {
    /// Frames the host sent, in order.
    pub fn host_frames(&self) -> Vec<Vec<u8>> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::HostFrame(frame) => Some(frame.clone()),
                Event::DeviceFrame(_) => None,
            })
            .collect()
    }

    fn respond(&mut self, response: Response) {
        let frame = self
            .scripted
            .pop_front()
            .unwrap_or_else(|| response.encode());
        self.outbox.push_back(frame);
    }

    fn respond_error(&mut self, code: DeviceErrorCode) {
        self.respond(Response::Error(code));
    }

    fn process(&mut self, frame: &[u8]) {
        self.events.push(Event::HostFrame(frame.to_vec()));

        match std::mem::replace(&mut self.mode, Mode::Commands) {
            Mode::Commands => self.process_command(frame),
            Mode::ConfigBlocks { remaining, mut buf } => {
                buf.extend_from_slice(frame);
                if remaining > 1 {
                    self.mode = Mode::ConfigBlocks {
                        remaining: remaining - 1,
                        buf,
                    };
                } else {
                    self.stage_config(buf);
                }
            }
            Mode::OtaPackets {
                remaining,
                length,
                mut buf,
            } => {
                buf.extend_from_slice(frame);
                if remaining > 1 {
                    self.mode = Mode::OtaPackets {
                        remaining: remaining - 1,
                        length,
                        buf,
                    };
                } else {
                    buf.truncate(length);
                    self.accept_ota_chunk(buf);
                }
            }
        }
    }

    fn process_command(&mut self, frame: &[u8]) {
        let command = match Command::decode(frame) {
            Ok(command) => command,
            Err(_) => return self.respond_error(DeviceErrorCode::UnknownCommand),
        };

        match command {
            Command::GetState => {
                let status = self.status.clone();
                self.respond(Response::State(status));
            }
            Command::ReadConfig => {
                if let Some(frame) = self.scripted.pop_front() {
                    return self.outbox.push_back(frame);
                }
                let blocks = self.config.len().div_ceil(BLOCK_SIZE);
                self.outbox.push_back(
                    Response::Config {
                        block_count: blocks as u8,
                    }
                    .encode(),
                );
                let config = self.config.clone();
                for chunk in config.chunks(BLOCK_SIZE) {
                    let mut block = chunk.to_vec();
                    block.resize(BLOCK_SIZE, 0);
                    self.outbox.push_back(block);
                }
            }
            Command::WriteConfig { blocks } => match blocks.get() {
                0 => self.stage_config(Vec::new()),
                n => {
                    self.mode = Mode::ConfigBlocks {
                        remaining: n,
                        buf: Vec::with_capacity(n * BLOCK_SIZE),
                    }
                }
            },
            Command::CommitConfig => match self.staged.take() {
                Some(config) => {
                    self.config = config;
                    self.commits += 1;
                    self.respond(Response::Ok);
                }
                None => self.respond_error(DeviceErrorCode::InvalidConfig),
            },
            Command::SetKeepAwake { enabled } => {
                self.status.keep_awake = enabled;
                self.respond(Response::Ok);
            }
            Command::Reboot => {
                self.reboots += 1;
                self.respond(Response::Ok);
            }
            Command::OtaStart { size, crc } => {
                let size = size as usize;
                if self.ota.is_some() {
                    self.respond_error(DeviceErrorCode::Ota(OtaErrorCode::AlreadyInProgress));
                } else if size == 0 || size > MAX_FIRMWARE_SIZE {
                    self.respond_error(DeviceErrorCode::Ota(OtaErrorCode::InvalidSize));
                } else {
                    self.ota = Some(OtaSession {
                        size,
                        crc,
                        data: Vec::with_capacity(size),
                    });
                    self.respond(Response::Ok);
                }
            }
            Command::OtaData { packets, length } => {
                self.mode = Mode::OtaPackets {
                    remaining: packets.get(),
                    length: length as usize,
                    buf: Vec::with_capacity(packets.byte_len()),
                };
            }
            Command::OtaAbort => {
                self.ota = None;
                self.respond(Response::Ok);
            }
            Command::OtaStatus => match &self.ota {
                Some(ota) => {
                    let progress = Response::Progress {
                        received: ota.data.len() as u32,
                        total: ota.size as u32,
                    };
                    self.respond(progress);
                }
                None => self.respond(Response::Ok),
            },
        }
    }

    fn stage_config(&mut self, buf: Vec<u8>) {
        let end = payload_end(&buf);
        let payload = buf[..end].to_vec();
        if serde_json::from_slice::<serde_json::Value>(&payload).is_ok() {
            self.staged = Some(payload);
            self.respond(Response::Ok);
        } else {
            self.respond_error(DeviceErrorCode::InvalidConfig);
        }
    }

    fn accept_ota_chunk(&mut self, chunk: Vec<u8>) {
        let corrupt = self.corrupt_ota;
        let Some(ota) = self.ota.as_mut() else {
            return self.respond_error(DeviceErrorCode::Ota(OtaErrorCode::NotStarted));
        };
        ota.data.extend_from_slice(&chunk);
        if ota.data.len() < ota.size {
            let progress = Response::Progress {
                received: ota.data.len() as u32,
                total: ota.size as u32,
            };
            return self.respond(progress);
        }

        if corrupt {
            ota.data[0] ^= 0xFF;
        }
        if crc32(&ota.data) == ota.crc {
            let image = std::mem::take(&mut ota.data);
            self.ota = None;
            self.firmware = Some(image);
            self.respond(Response::Complete);
        } else {
            self.respond_error(DeviceErrorCode::Ota(OtaErrorCode::CrcMismatch));
        }
    }

    fn next_frame(&mut self) -> Option<Result<Vec<u8>, TransportError>> {
        if self.close_after.is_some_and(|limit| self.delivered >= limit) {
            return Some(Err(TransportError::Closed));
        }
        let frame = self.outbox.pop_front()?;
        self.delivered += 1;
        self.events.push(Event::DeviceFrame(frame.clone()));
        Some(Ok(frame))
    }
}

/// Default state record: firmware 0.9.0 on a XIAO ESP32S3 with LED and SmartLED.
pub fn default_status() -> DeviceStatus {
    DeviceStatus {
        version: FirmwareVersion::new(0, 9, 0),
        features: Features::LED | Features::SMART_LED,
        feature_bits: 0x03,
        address: None,
        server_connected: true,
        active: true,
        keep_awake: false,
        model: Model(6),
    }
}

/// Shared handle to an emulated device.
#[derive(Debug, Clone)]
pub struct MockDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    pub fn new() -> Self {
        MockDevice {
            state: Arc::new(Mutex::new(DeviceState {
                status: default_status(),
                config: br#"{"ssid":"home","password":"hunter22","server":"10.0.0.2:24800","screen_name":"desk"}"#.to_vec(),
                staged: None,
                commits: 0,
                reboots: 0,
                firmware: None,
                corrupt_ota: false,
                silent: false,
                close_after: None,
                fail_send_after: None,
                scripted: VecDeque::new(),
                events: Vec::new(),
                delivered: 0,
                accepted: 0,
                outbox: VecDeque::new(),
                mode: Mode::Commands,
                ota: None,
            })),
        }
    }

    pub fn with_config(config: &[u8]) -> Self {
        let device = Self::new();
        device.state().config = config.to_vec();
        device
    }

    pub fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().expect("device state poisoned")
    }

    /// Answer the next command with `frame` instead of the computed response.
    pub fn script(&self, frame: &[u8]) {
        self.state().scripted.push_back(frame.to_vec());
    }

    /// Handle one host frame synchronously.
    pub fn process(&self, frame: &[u8]) {
        self.state().process(frame);
    }

    /// Take every queued response frame.
    pub fn drain(&self) -> Vec<Vec<u8>> {
        let mut state = self.state();
        let mut frames = Vec::new();
        while let Some(Ok(frame)) = state.next_frame() {
            frames.push(frame);
        }
        frames
    }
}

impl Transport for MockDevice {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        if state.close_after.is_some_and(|limit| state.delivered >= limit) {
            return Err(TransportError::Closed);
        }
        if state
            .fail_send_after
            .is_some_and(|limit| state.accepted >= limit)
        {
            return Err(TransportError::Closed);
        }
        state.accepted += 1;
        state.process(frame);
        Ok(())
    }

    async fn receive(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        tokio::task::yield_now().await;
        let next = {
            let mut state = self.state();
            if state.silent {
                None
            } else {
                Some(state.next_frame().unwrap_or(Err(TransportError::Closed)))
            }
        };
        match next {
            Some(Ok(frame)) if frame.len() > max_len => Err(TransportError::FrameTooLong {
                max: max_len,
                actual: frame.len(),
            }),
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
