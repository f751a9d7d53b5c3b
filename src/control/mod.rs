//! Out-of-band control queries.
//!
//! The control plane answers two fixed-size queries independent of the audio
//! path:
//!
//! | Code | Raw | Output |
//! |---|---|---|
//! | [`ControlCode::GetInfo`] | `0x8000_2000` | [`ControlInfo`] (32 bytes) |
//! | [`ControlCode::GetStatus`] | `0x8000_6004` | [`ControlStatus`] (36 bytes) |
//!
//! Requests go through [`ControlHandle::device_io_control`], which looks the
//! operation up in a single table keyed by [`ControlCode`]. Output is
//! all-or-nothing: on any failure the caller's buffer is not written.

mod records;

pub use records::{ControlInfo, ControlStatus};

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use crate::topology::Topology;
use crate::ControlError;

/// Version reported by `GetInfo` (major in the high 16 bits).
pub const DRIVER_VERSION: u32 = 0x0001_0000;

/// Device type of the virtual audio control device.
const FILE_DEVICE_VIRTUAL_AUDIO: u32 = 0x8000;
const METHOD_BUFFERED: u32 = 0;
const FILE_ANY_ACCESS: u32 = 0;
const FILE_READ_ACCESS: u32 = 1;

/// Packs a control code the way the host's `CTL_CODE` macro does.
const fn ctl_code(device_type: u32, function: u32, method: u32, access: u32) -> u32 {
    (device_type << 16) | (access << 14) | (function << 2) | method
}

/// Control operations understood by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCode {
    /// Static capability snapshot.
    GetInfo,
    /// Live device state.
    GetStatus,
}

impl ControlCode {
    /// Every supported operation.
    pub const ALL: [Self; 2] = [Self::GetInfo, Self::GetStatus];

    /// Raw code as sent across the control boundary.
    pub const fn raw(self) -> u32 {
        match self {
            Self::GetInfo => ctl_code(
                FILE_DEVICE_VIRTUAL_AUDIO,
                0x800,
                METHOD_BUFFERED,
                FILE_ANY_ACCESS,
            ),
            Self::GetStatus => ctl_code(
                FILE_DEVICE_VIRTUAL_AUDIO,
                0x801,
                METHOD_BUFFERED,
                FILE_READ_ACCESS,
            ),
        }
    }

    /// Maps a raw code to its operation.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::UnsupportedCode`] for unknown codes.
    pub fn from_raw(code: u32) -> Result<Self, ControlError> {
        Self::ALL
            .into_iter()
            .find(|op| op.raw() == code)
            .ok_or(ControlError::UnsupportedCode { code })
    }

    /// Size of the response record in bytes.
    pub fn output_size(self) -> usize {
        operation(self).output_size
    }
}

/// Live state the capture side publishes for `GetStatus`.
///
/// Every field is an atomic, so the capture path updates it without locking
/// and a query always reads the value at the instant of the call.
#[derive(Debug, Default)]
pub struct DeviceState {
    speaker_active: AtomicBool,
    mic_active: AtomicBool,
    sample_rate: AtomicU32,
}

impl DeviceState {
    /// Creates an idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records whether a render stream is running.
    pub fn set_speaker_active(&self, active: bool) {
        self.speaker_active.store(active, Ordering::Release);
    }

    /// Records whether a capture stream is running.
    pub fn set_mic_active(&self, active: bool) {
        self.mic_active.store(active, Ordering::Release);
    }

    /// Records the negotiated sample rate of the active stream.
    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Release);
    }

    /// Current state as a wire record.
    pub fn snapshot(&self) -> ControlStatus {
        ControlStatus::new(
            self.speaker_active.load(Ordering::Acquire),
            self.mic_active.load(Ordering::Acquire),
            self.sample_rate.load(Ordering::Acquire),
        )
    }
}

struct ServiceInner {
    info: ControlInfo,
    state: Arc<DeviceState>,
}

/// Writes exactly `output_size` bytes into the slice it is given.
type Handler = fn(&ServiceInner, &mut [u8]);

struct Operation {
    code: ControlCode,
    output_size: usize,
    handler: Handler,
}

static OPERATIONS: [Operation; 2] = [
    Operation {
        code: ControlCode::GetInfo,
        output_size: ControlInfo::SIZE,
        handler: handle_get_info,
    },
    Operation {
        code: ControlCode::GetStatus,
        output_size: ControlStatus::SIZE,
        handler: handle_get_status,
    },
];

fn operation(code: ControlCode) -> &'static Operation {
    // Every ControlCode variant has exactly one table entry.
    match code {
        ControlCode::GetInfo => &OPERATIONS[0],
        ControlCode::GetStatus => &OPERATIONS[1],
    }
}

fn handle_get_info(service: &ServiceInner, out: &mut [u8]) {
    out.copy_from_slice(service.info.as_bytes());
}

fn handle_get_status(service: &ServiceInner, out: &mut [u8]) {
    out.copy_from_slice(service.state.snapshot().as_bytes());
}

/// Answers control queries for one virtual device.
///
/// Handles opened from the service become invalid once it is dropped.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use virtual_mic::{ControlService, DeviceState, Topology};
///
/// let state = Arc::new(DeviceState::new());
/// let service = ControlService::new(&Topology::default(), Arc::clone(&state));
/// let handle = service.open();
///
/// assert_eq!(handle.get_info()?.mic_count, 1);
///
/// state.set_mic_active(true);
/// assert!(handle.get_status()?.mic_active());
/// # Ok::<(), virtual_mic::ControlError>(())
/// ```
pub struct ControlService {
    inner: Arc<ServiceInner>,
}

impl ControlService {
    /// Builds the service; the `GetInfo` snapshot is fixed from `topology` here.
    pub fn new(topology: &Topology, state: Arc<DeviceState>) -> Self {
        let info = ControlInfo::new(DRIVER_VERSION, topology.speaker_count(), topology.mic_count());
        tracing::debug!(?info, "control service ready");
        Self {
            inner: Arc::new(ServiceInner { info, state }),
        }
    }

    /// Opens a handle for issuing queries.
    pub fn open(&self) -> ControlHandle {
        ControlHandle {
            service: Arc::downgrade(&self.inner),
            open: true,
        }
    }

    /// The static capability snapshot.
    pub fn info(&self) -> ControlInfo {
        self.inner.info
    }

    /// The live state this service reports.
    pub fn state(&self) -> &Arc<DeviceState> {
        &self.inner.state
    }
}

impl std::fmt::Debug for ControlService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlService")
            .field("info", &self.inner.info)
            .finish_non_exhaustive()
    }
}

/// Client handle to a [`ControlService`].
#[derive(Debug, Clone)]
pub struct ControlHandle {
    service: Weak<ServiceInner>,
    open: bool,
}

impl ControlHandle {
    /// Issues a raw control request, writing the response into `output`.
    ///
    /// Returns the number of bytes written, which is always the record size of
    /// the operation. `output` may be larger than needed; extra bytes are not
    /// touched.
    ///
    /// # Errors
    ///
    /// - [`ControlError::InvalidArgument`] if the handle is closed, the
    ///   service is gone, or `output` is smaller than the record
    /// - [`ControlError::UnsupportedCode`] if `code` is unknown
    ///
    /// `output` is unchanged on every error.
    pub fn device_io_control(&self, code: u32, output: &mut [u8]) -> Result<usize, ControlError> {
        let service = self.service()?;
        let op = operation(ControlCode::from_raw(code)?);

        let Some(out) = output.get_mut(..op.output_size) else {
            return Err(ControlError::invalid_argument(format!(
                "{:?} needs {} output bytes, got {}",
                op.code,
                op.output_size,
                output.len()
            )));
        };

        (op.handler)(&service, out);
        tracing::trace!(code = ?op.code, bytes = op.output_size, "control request served");
        Ok(op.output_size)
    }

    /// Returns the static capability snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidArgument`] if the handle is invalid.
    pub fn get_info(&self) -> Result<ControlInfo, ControlError> {
        let mut buf = [0u8; ControlInfo::SIZE];
        self.device_io_control(ControlCode::GetInfo.raw(), &mut buf)?;
        Ok(bytemuck::pod_read_unaligned(&buf))
    }

    /// Returns the device state at the instant of the call.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidArgument`] if the handle is invalid.
    pub fn get_status(&self) -> Result<ControlStatus, ControlError> {
        let mut buf = [0u8; ControlStatus::SIZE];
        self.device_io_control(ControlCode::GetStatus.raw(), &mut buf)?;
        Ok(bytemuck::pod_read_unaligned(&buf))
    }

    /// Releases the handle; later requests fail with `InvalidArgument`.
    pub fn close(&mut self) {
        self.open = false;
    }

    /// Returns `true` if the handle is open and its service still exists.
    pub fn is_valid(&self) -> bool {
        self.open && self.service.strong_count() > 0
    }

    fn service(&self) -> Result<Arc<ServiceInner>, ControlError> {
        if !self.open {
            return Err(ControlError::invalid_argument("handle is closed"));
        }
        self.service
            .upgrade()
            .ok_or_else(|| ControlError::invalid_argument("control service is gone"))
    }
}
