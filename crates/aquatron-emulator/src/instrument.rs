//! Behavioral model of the instrument firmware.
//!
//! An [`Instrument`] consumes host frames and produces the frames the real
//! board would answer with:
//!
//! | host → instrument        | instrument → host                  |
//! |--------------------------|------------------------------------|
//! | `GET_DEVICE_READY`       | `DEVICE_IS_READY`                  |
//! | `SEND_SW_PARAMETERS`     | `DATA_ACK` then `DEVICE_IS_READY`  |
//! | `SET_DEVICE_SETTINGS`    | `DATA_ACK` then `DEVICE_IS_READY`  |
//! | `GET_DEVICE_SETTINGS`    | `DEVICE_SETTINGS` report           |
//! | `GET_FEEDBACK_INFO`      | `FEEDBACK_INFO` (47 bytes)         |
//!
//! Delivery payloads that fail to decode are answered with nothing, the way
//! the board drops a packet it cannot apply.
//!
//! # Examples
//!
//! ```
//! use aquatron_emulator::Instrument;
//! use aquatron_protocol::{CommandCode, Frame};
//!
//! let mut instrument = Instrument::builder().with_device_id(vec![0x0A, 0x0B]).build();
//! let replies = instrument.respond(&Frame::command_only(CommandCode::GetDeviceReady));
//!
//! assert_eq!(replies.len(), 1);
//! assert_eq!(replies[0].command(), Some(CommandCode::DeviceIsReady));
//! assert_eq!(replies[0].payload(), &[0x0A, 0x0B]);
//! ```

use std::collections::VecDeque;

use aquatron_core::{DeviceSettings, ElementSpec};
use aquatron_protocol::payload::{adc, settings, sw_params};
use aquatron_protocol::{CommandCode, DeviceSettingsReport, FeedbackInfo, Frame};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Received commands kept for inspection.
const MAX_HISTORY_SIZE: usize = 100;

/// What the instrument did with the last delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentState {
    /// Nothing delivered yet.
    #[default]
    Idle,

    /// SW parameters applied.
    Dosing,

    /// Settings applied.
    Configured,
}

pub struct InstrumentBuilder {
    device_id: Vec<u8>,
    report: DeviceSettingsReport,
    feedback: FeedbackInfo,
    answer_ready: bool,
}

impl Default for InstrumentBuilder {
    fn default() -> Self {
        Self {
            device_id: vec![0x01],
            report: DeviceSettingsReport {
                feedback_enabled: true,
                feedback_tolerance: 0.05,
                ..DeviceSettingsReport::default()
            },
            feedback: FeedbackInfo {
                enabled: true,
                tolerance: 0.05,
                correction_factor: 0.5,
                max_iterations: 5,
                settle_delay: 50,
                adc_vref: 3.3,
                adc_resolution: 12,
                dac_resolution: 12,
                ..FeedbackInfo::default()
            },
            answer_ready: true,
        }
    }
}

impl InstrumentBuilder {
    /// Payload of heartbeat and ready frames.
    pub fn with_device_id(mut self, device_id: Vec<u8>) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn with_settings(mut self, report: DeviceSettingsReport) -> Self {
        self.report = report;
        self
    }

    pub fn with_feedback(mut self, feedback: FeedbackInfo) -> Self {
        self.feedback = feedback;
        self
    }

    /// When `false` the instrument never sends `DEVICE_IS_READY`.
    pub fn answer_ready(mut self, answer_ready: bool) -> Self {
        self.answer_ready = answer_ready;
        self
    }

    pub fn build(self) -> Instrument {
        Instrument {
            device_id: self.device_id,
            report: self.report,
            feedback: self.feedback,
            answer_ready: self.answer_ready,
            state: InstrumentState::Idle,
            elements: Vec::new(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Instrument {
    device_id: Vec<u8>,
    report: DeviceSettingsReport,
    feedback: FeedbackInfo,
    answer_ready: bool,
    state: InstrumentState,
    elements: Vec<ElementSpec>,
    history: VecDeque<u8>,
}

impl Default for Instrument {
    fn default() -> Self {
        InstrumentBuilder::default().build()
    }
}

impl Instrument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InstrumentBuilder {
        InstrumentBuilder::default()
    }

    pub fn state(&self) -> InstrumentState {
        self.state
    }

    /// Elements of the last accepted SW-parameters command.
    pub fn elements(&self) -> &[ElementSpec] {
        &self.elements
    }

    pub fn settings(&self) -> &DeviceSettings {
        &self.report.settings
    }

    pub fn feedback(&self) -> &FeedbackInfo {
        &self.feedback
    }

    /// Command codes received, oldest first.
    pub fn history(&self) -> impl Iterator<Item = u8> + '_ {
        self.history.iter().copied()
    }

    pub fn set_answer_ready(&mut self, answer_ready: bool) {
        self.answer_ready = answer_ready;
    }

    /// `DEVICE_ONLINE` carrying the device id.
    pub fn heartbeat_frame(&self) -> Frame {
        self.frame(CommandCode::DeviceOnline, &self.device_id)
            .unwrap_or_else(|| Frame::command_only(CommandCode::DeviceOnline))
    }

    /// `ADC_DATA` telemetry frame.
    pub fn adc_frame(&self, samples: &[u16]) -> Option<Frame> {
        self.frame(CommandCode::AdcData, &adc::encode_adc_samples(samples))
    }

    /// Frames answering one host frame, in transmission order.
    pub fn respond(&mut self, request: &Frame) -> Vec<Frame> {
        if self.history.len() == MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(request.cmd());

        let Some(command) = request.command() else {
            debug!(cmd = request.cmd(), "Ignoring unknown command");
            return Vec::new();
        };

        match command {
            CommandCode::GetDeviceReady => self.ready().into_iter().collect(),
            CommandCode::SendSwParameters => match sw_params::decode(request.payload()) {
                Ok(elements) => {
                    debug!(count = elements.len(), "SW parameters applied");
                    self.elements = elements;
                    self.state = InstrumentState::Dosing;
                    self.ack_and_ready(command)
                }
                Err(e) => {
                    warn!(error = %e, "Rejecting SW parameters");
                    Vec::new()
                }
            },
            CommandCode::SetDeviceSettings => match settings::decode(request.payload()) {
                Ok(settings) => {
                    debug!(duration_ms = settings.duration_ms, "Settings applied");
                    self.report.settings = settings;
                    self.state = InstrumentState::Configured;
                    self.ack_and_ready(command)
                }
                Err(e) => {
                    warn!(error = %e, "Rejecting settings");
                    Vec::new()
                }
            },
            CommandCode::GetDeviceSettings => match settings::encode_report(&self.report) {
                Ok(payload) => self.frame(CommandCode::DeviceSettings, &payload).into_iter().collect(),
                Err(e) => {
                    warn!(error = %e, "Settings report does not encode");
                    Vec::new()
                }
            },
            CommandCode::GetFeedbackInfo => self
                .frame(CommandCode::FeedbackInfo, &self.feedback.encode())
                .into_iter()
                .collect(),
            other => {
                debug!(command = %other, "No answer for inbound-only command");
                Vec::new()
            }
        }
    }

    fn ready(&self) -> Option<Frame> {
        if !self.answer_ready {
            return None;
        }
        self.frame(CommandCode::DeviceIsReady, &self.device_id)
    }

    fn ack_and_ready(&self, command: CommandCode) -> Vec<Frame> {
        self.frame(CommandCode::DataAck, &[command.as_u8()])
            .into_iter()
            .chain(self.ready())
            .collect()
    }

    fn frame(&self, command: CommandCode, payload: &[u8]) -> Option<Frame> {
        Frame::encode(command, payload)
            .inspect_err(|e| warn!(command = %command, error = %e, "Reply does not fit a frame"))
            .ok()
    }
}
