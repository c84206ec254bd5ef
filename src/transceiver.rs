//! Reader transport contract
//!
//! The core never talks to a physical reader: it hands an ordered
//! sequence of command APDUs to an [`ApduTransceiver`] and gets the
//! matching sequence of response APDUs back. Contact and contactless
//! readers, as well as the SAM slot, all sit behind this one seam.

use apdu::{ApduRequest, ApduResponse};
use error::Error;

/// Transport errors
pub type TransceiverError = Error<TransceiverErrorKind>;

/// Transport error kinds
#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
pub enum TransceiverErrorKind {
    /// Input/output error while exchanging with the reader
    #[fail(display = "I/O error")]
    IoError,

    /// The card or SAM left the field or the channel dropped
    #[fail(display = "communication lost")]
    CommunicationLost,

    /// The reader returned a malformed response
    #[fail(display = "bad reader response")]
    ResponseError,
}

/// Physical-channel policy applied after an exchange
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChannelControl {
    /// Leave the channel open for further exchanges
    KeepOpen,

    /// Close the channel (and power the card down) after this exchange
    CloseAfter,
}

/// An ordered sequence of command APDUs sent as one exchange
#[derive(Clone, Debug)]
pub struct CardRequest {
    apdus: Vec<ApduRequest>,
    stop_on_unsuccessful: bool,
}

impl CardRequest {
    /// Bundle APDUs into a request
    pub fn new(apdus: Vec<ApduRequest>, stop_on_unsuccessful: bool) -> Self {
        Self {
            apdus,
            stop_on_unsuccessful,
        }
    }

    /// The command APDUs, in transmission order
    pub fn apdus(&self) -> &[ApduRequest] {
        &self.apdus
    }

    /// Whether the transceiver may short-circuit the remaining APDUs
    /// after one whose status word is not in its successful set
    pub fn stop_on_unsuccessful(&self) -> bool {
        self.stop_on_unsuccessful
    }
}

/// The ordered response APDUs of an exchange.
///
/// Holds at most as many entries as the request: a transceiver that
/// stops on error returns the responses received so far, the failing
/// one included.
#[derive(Clone, Debug)]
pub struct CardResponse {
    apdus: Vec<ApduResponse>,
}

impl CardResponse {
    /// Bundle response APDUs
    pub fn new(apdus: Vec<ApduResponse>) -> Self {
        Self { apdus }
    }

    /// The response APDUs, in reception order
    pub fn apdus(&self) -> &[ApduResponse] {
        &self.apdus
    }

    /// Consume the response, yielding its APDUs
    pub fn into_apdus(self) -> Vec<ApduResponse> {
        self.apdus
    }
}

/// Abstract APDU transport: the only way in and out of a card or SAM
pub trait ApduTransceiver {
    /// Transmit every APDU of `request` in order and collect the
    /// responses. Implementations honour `stop_on_unsuccessful` and the
    /// channel-control policy.
    fn exchange(
        &mut self,
        request: &CardRequest,
        channel_control: ChannelControl,
    ) -> Result<CardResponse, TransceiverError>;
}
