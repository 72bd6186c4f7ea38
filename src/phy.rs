//! Physical-layer abstraction
//!
//! The MAC drives the radio exclusively through [`PhyPort`]; the PHY
//! answers asynchronously through the engine's `on_*_confirm` entry points.
//! Nothing here models propagation or modulation: a deployment plugs in a
//! radio driver, the test suite plugs in the in-memory medium from `sim`.

/// Maximum PHY packet (PSDU) size in bytes.
pub const MAX_PHY_PACKET_SIZE: usize = 127;

/// MAC header overhead per frame in bytes.
pub const MPDU_OVERHEAD: usize = 10;

/// Largest payload that fits in one frame.
pub const MAX_MAC_PAYLOAD: usize = MAX_PHY_PACKET_SIZE - MPDU_OVERHEAD;

/// One backoff unit, in symbols.
pub const UNIT_BACKOFF_PERIOD: u64 = 20;

/// Transceiver states the MAC can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrxState {
    RxOn,
    TxOn,
}

/// Result of a clear-channel assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcaStatus {
    Idle,
    Busy,
}

/// Result of a transmit request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhyTxStatus {
    Success,
    /// Unspecified PHY-side failure; the frame was not delivered.
    Failure,
}

/// Confirmation of a transceiver state request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrxStateConfirm {
    /// The PHY is now in the requested state.
    Set(TrxState),
    /// The PHY was already in the requested state.
    AlreadySet(TrxState),
}

impl TrxStateConfirm {
    pub fn state(&self) -> TrxState {
        match self {
            TrxStateConfirm::Set(s) | TrxStateConfirm::AlreadySet(s) => *s,
        }
    }
}

/// Downward interface from the MAC to the radio.
///
/// All three request methods are confirmed asynchronously via the
/// corresponding `MacEngine::on_*` entry point; the MAC never begins a new
/// request while one of the same kind is outstanding.
pub trait PhyPort {
    /// Request a transceiver state change; confirmed via
    /// `on_trx_state_confirm`.
    fn request_trx_state(&mut self, state: TrxState);

    /// Request a clear-channel assessment; confirmed via `on_cca_confirm`.
    fn request_cca(&mut self);

    /// Hand a fully encoded frame to the radio; confirmed via
    /// `on_tx_confirm` once the transmission ends.
    fn transmit(&mut self, psdu: Vec<u8>);

    /// Channel symbol rate in symbols per second, used to convert backoff
    /// units to wall-clock time.
    fn symbol_rate(&self) -> u64;
}
